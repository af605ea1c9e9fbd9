//! Stream variants and the byte sources they open

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use bytes::{Buf, Bytes};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use super::error::StreamError;

/// How long a freshly spawned stream program must survive to count as opened
pub const PROCESS_STARTUP_GRACE: Duration = Duration::from_millis(500);

/// A stream backed by an external program writing media to its stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStream {
    pub program: String,
    pub args: Vec<String>,
    /// Keep stderr in a temporary file instead of discarding it
    pub errorlog: bool,
    /// Argument that must appear in the program's `--help` output
    pub requires_flag: Option<String>,
}

impl ProcessStream {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            errorlog: false,
            requires_flag: None,
        }
    }

    /// Command line as it would be typed in a shell
    pub fn cmdline(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| {
            let mut line = self.program.clone();
            for arg in &self.args {
                line.push(' ');
                line.push_str(arg);
            }
            line
        })
    }

    /// Make sure the installed program understands `requires_flag`
    async fn check_support(&self, flag: &str) -> Result<(), StreamError> {
        let output = Command::new(&self.program)
            .arg("--help")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StreamError::CommandNotFound(self.program.clone()));
            }
            Err(error) => {
                return Err(StreamError::Compatibility {
                    program: self.program.clone(),
                    error,
                });
            }
        };

        // Help goes to stderr for some builds
        let help = [output.stdout, output.stderr].concat();
        if supports_flag(&String::from_utf8_lossy(&help), flag) {
            Ok(())
        } else {
            Err(StreamError::Unsupported {
                program: self.program.clone(),
                flag: flag.to_string(),
            })
        }
    }

    async fn open(&self) -> Result<ByteSource, StreamError> {
        if let Some(flag) = &self.requires_flag {
            self.check_support(flag).await?;
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let errorlog = if self.errorlog {
            let file = tempfile::Builder::new()
                .prefix("lsmgr")
                .suffix(".err")
                .tempfile()?;
            let (file, path) = file.keep().map_err(|e| StreamError::Io(e.error))?;
            command.stderr(Stdio::from(file));
            Some(path)
        } else {
            command.stderr(Stdio::null());
            None
        };

        tracing::debug!(cmdline = %self.cmdline(), "Spawning stream process");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StreamError::CommandNotFound(self.program.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        // A program that dies straight away never produced a stream
        tokio::time::sleep(PROCESS_STARTUP_GRACE).await;
        if child.try_wait()?.is_some() {
            return Err(StreamError::ProcessExited {
                program: self.program.clone(),
                errorlog,
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stream process has no stdout"))?;

        Ok(ByteSource::Process { child, stdout })
    }
}

/// Whether `help` documents `flag` at the start of a line
fn supports_flag(help: &str, flag: &str) -> bool {
    help.lines().any(|line| line.trim_start().starts_with(flag))
}

/// A quality offered by a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stream {
    /// Plain HTTP download
    Http { url: String },
    /// Output of an external program
    Process(ProcessStream),
    /// Local file or device
    File { path: PathBuf },
    /// Bytes already in memory
    Buffer(Bytes),
}

impl Stream {
    /// Short name of the variant, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Stream::Http { .. } => "http",
            Stream::Process(_) => "process",
            Stream::File { .. } => "file",
            Stream::Buffer(_) => "buffer",
        }
    }

    /// Command line of the program behind the stream, if there is one
    pub fn cmdline(&self) -> Option<String> {
        match self {
            Stream::Process(process) => Some(process.cmdline()),
            _ => None,
        }
    }

    /// Open a connection to the stream
    pub async fn open(&self) -> Result<ByteSource, StreamError> {
        match self {
            Stream::Http { url } => {
                let response = reqwest::get(url.as_str()).await?.error_for_status()?;
                Ok(ByteSource::Http {
                    response,
                    pending: Bytes::new(),
                })
            }
            Stream::Process(process) => process.open().await,
            Stream::File { path } => {
                let file = tokio::fs::File::open(path).await?;
                Ok(ByteSource::File(file))
            }
            Stream::Buffer(data) => Ok(ByteSource::Buffer(data.clone())),
        }
    }
}

/// An opened stream
pub enum ByteSource {
    Http { response: reqwest::Response, pending: Bytes },
    Process { child: Child, stdout: ChildStdout },
    File(tokio::fs::File),
    Buffer(Bytes),
}

impl ByteSource {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::Http { response, pending } => {
                if pending.is_empty() {
                    match response.chunk().await.map_err(io::Error::other)? {
                        Some(chunk) => *pending = chunk,
                        None => return Ok(0),
                    }
                }
                Ok(copy_front(pending, buf))
            }
            ByteSource::Process { stdout, .. } => stdout.read(buf).await,
            ByteSource::File(file) => file.read(buf).await,
            ByteSource::Buffer(data) => Ok(copy_front(data, buf)),
        }
    }

    /// Release the stream. Process-backed streams are killed and reaped.
    pub async fn close(self) {
        if let ByteSource::Process { mut child, stdout } = self {
            drop(stdout);
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "Stream process already gone");
            }
        }
    }
}

fn copy_front(data: &mut Bytes, buf: &mut [u8]) -> usize {
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    data.advance(n);
    n
}
