//! Loopback transport for the supervision channel

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::error::ChannelError;
use super::message::ControlMessage;

const READ_BUFFER_SIZE: usize = 1024;

/// Shell-side listener that a single worker connects back to
pub struct SupervisionListener {
    listener: TcpListener,
}

impl SupervisionListener {
    /// Bind an ephemeral loopback port
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        Ok(Self { listener })
    }

    /// Address to hand to the worker
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for the worker to connect
    pub async fn accept(&self) -> io::Result<SupervisionChannel> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::trace!(peer = %peer, "Supervision channel accepted");
        SupervisionChannel::from_stream(stream)
    }
}

/// One end of a worker's supervision channel
pub struct SupervisionChannel {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl SupervisionChannel {
    /// Worker side: connect back to the shell
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(64),
        })
    }

    /// Connected listener/channel pair in one process, for exercising
    /// workers without spawning one.
    pub async fn pair() -> io::Result<(Self, Self)> {
        let listener = SupervisionListener::bind().await?;
        let addr = listener.local_addr()?;
        let (accepted, connected) = tokio::join!(listener.accept(), Self::connect(addr));
        Ok((accepted?, connected?))
    }

    /// Send one message
    pub async fn send(&mut self, msg: &ControlMessage) -> Result<(), ChannelError> {
        self.write_buf.clear();
        msg.encode(&mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. Cancel
    /// safe: partially received frames stay buffered for the next call.
    pub async fn recv(&mut self) -> Result<Option<ControlMessage>, ChannelError> {
        loop {
            if let Some(msg) = ControlMessage::parse_frame(&mut self.read_buf)? {
                return Ok(Some(msg));
            }

            self.read_buf.reserve(READ_BUFFER_SIZE);
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(ChannelError::Truncated);
            }
        }
    }

    /// Poll for a message without blocking.
    ///
    /// `Err(ChannelError::Closed)` means the peer is gone.
    pub fn try_recv(&mut self) -> Result<Option<ControlMessage>, ChannelError> {
        loop {
            if let Some(msg) = ControlMessage::parse_frame(&mut self.read_buf)? {
                return Ok(Some(msg));
            }

            self.read_buf.reserve(READ_BUFFER_SIZE);
            match self.stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::Failure;

    #[tokio::test]
    async fn test_pair_carries_messages_both_ways() {
        let (mut shell, mut worker) = SupervisionChannel::pair().await.unwrap();

        worker
            .send(&ControlMessage::Failed(Failure::new("No plugin can handle URL: x")))
            .await
            .unwrap();
        let msg = shell.recv().await.unwrap();
        assert!(matches!(msg, Some(ControlMessage::Failed(f)) if f.reason.contains("No plugin")));

        shell.send(&ControlMessage::Kill).await.unwrap();
        assert_eq!(worker.recv().await.unwrap(), Some(ControlMessage::Kill));
    }

    #[tokio::test]
    async fn test_try_recv_is_non_blocking() {
        let (mut shell, mut worker) = SupervisionChannel::pair().await.unwrap();

        assert_eq!(worker.try_recv().unwrap(), None);

        shell.send(&ControlMessage::Kill).await.unwrap();

        let mut received = None;
        for _ in 0..100 {
            if let Some(msg) = worker.try_recv().unwrap() {
                received = Some(msg);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received, Some(ControlMessage::Kill));
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let (shell, mut worker) = SupervisionChannel::pair().await.unwrap();
        drop(shell);

        assert_eq!(worker.recv().await.unwrap(), None);
        assert!(matches!(worker.try_recv(), Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_recv_survives_cancellation() {
        let (mut shell, mut worker) = SupervisionChannel::pair().await.unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(20), worker.recv()).await;
        assert!(timed_out.is_err());

        shell.send(&ControlMessage::Started).await.unwrap();
        assert_eq!(worker.recv().await.unwrap(), Some(ControlMessage::Started));
    }
}
