//! Byte counter shown while recording to a file

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Rewrites a `Written N bytes` line on `out` as data is relayed
pub struct ProgressMeter<W> {
    out: W,
    written: u64,
}

impl<W: AsyncWrite + Unpin> ProgressMeter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Bytes counted so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Count `n` more bytes and redraw the line
    pub async fn update(&mut self, n: usize) -> io::Result<()> {
        self.written += n as u64;
        let line = format!("\rWritten {} bytes", self.written);
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await
    }

    /// End the line, if one was drawn
    pub async fn finish(mut self) -> io::Result<W> {
        if self.written > 0 {
            self.out.write_all(b"\n").await?;
            self.out.flush().await?;
        }
        Ok(self.out)
    }
}
