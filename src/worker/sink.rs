//! Output sinks: a file, standard output, or a player's stdin

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use super::request::SinkTarget;

/// Error opening a sink
#[derive(Debug)]
pub enum SinkError {
    /// Output file exists and overwriting was not forced
    FileExists(PathBuf),
    /// Output file could not be created
    Create(PathBuf, io::Error),
    /// Player could not be started
    Player(String, io::Error),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::FileExists(path) => write!(f, "File {} already exists", path.display()),
            SinkError::Create(path, e) => {
                write!(f, "Failed to open file {} - {}", path.display(), e)
            }
            SinkError::Player(cmd, e) => write!(f, "Failed to start player '{}' - {}", cmd, e),
        }
    }
}

impl std::error::Error for SinkError {}

/// Destination of relayed stream bytes
pub enum Sink {
    File(tokio::fs::File),
    Stdout(tokio::io::Stdout),
    Player { child: Child, stdin: ChildStdin },
}

impl Sink {
    /// Open the sink for `target`. `player_cmd` is only used for the player target.
    pub async fn open(target: SinkTarget<'_>, force: bool, player_cmd: &str) -> Result<Self, SinkError> {
        match target {
            SinkTarget::Stdout => Ok(Sink::Stdout(tokio::io::stdout())),
            SinkTarget::File(path) => Self::open_file(path, force).await,
            SinkTarget::Player => Self::spawn_player(player_cmd),
        }
    }

    async fn open_file(path: &Path, force: bool) -> Result<Self, SinkError> {
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if exists && !force && path.is_file() {
            return Err(SinkError::FileExists(path.to_path_buf()));
        }

        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| SinkError::Create(path.to_path_buf(), e))?;
        Ok(Sink::File(file))
    }

    fn spawn_player(cmd: &str) -> Result<Self, SinkError> {
        let mut command = shell_command(cmd);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| SinkError::Player(cmd.to_string(), e))?;
        let stdin = child.stdin.take().ok_or_else(|| {
            SinkError::Player(cmd.to_string(), io::Error::other("player has no stdin"))
        })?;

        Ok(Sink::Player { child, stdin })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Sink::File(_) => "file",
            Sink::Stdout(_) => "stdout",
            Sink::Player { .. } => "player",
        }
    }

    /// Whether a byte counter belongs on stderr while relaying
    pub fn shows_progress(&self) -> bool {
        matches!(self, Sink::File(_))
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Sink::File(file) => file.write_all(data).await,
            Sink::Stdout(stdout) => stdout.write_all(data).await,
            Sink::Player { stdin, .. } => stdin.write_all(data).await,
        }
    }

    /// Release the sink: files are flushed and closed, the player is killed
    /// and reaped.
    pub async fn close(self) {
        match self {
            Sink::File(mut file) => {
                if let Err(e) = file.flush().await {
                    tracing::warn!(error = %e, "Failed to flush output file");
                }
                if let Err(e) = file.sync_all().await {
                    tracing::debug!(error = %e, "Failed to sync output file");
                }
            }
            Sink::Stdout(mut stdout) => {
                let _ = stdout.flush().await;
            }
            Sink::Player { mut child, stdin } => {
                drop(stdin);
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "Player already exited");
                }
            }
        }
    }
}

#[cfg(unix)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(windows)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_file_needs_force() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let target = SinkTarget::File(file.path());

        assert!(matches!(
            Sink::open(target, false, "").await,
            Err(SinkError::FileExists(_))
        ));
        assert!(Sink::open(target, true, "").await.is_ok());
    }

    #[tokio::test]
    async fn test_file_sink_is_flushed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.flv");

        let mut sink = Sink::open(SinkTarget::File(&path), false, "").await.unwrap();
        assert_eq!(sink.kind(), "file");
        assert!(sink.shows_progress());
        sink.write_all(b"FLV\x01").await.unwrap();
        sink.close().await;

        assert_eq!(std::fs::read(&path).unwrap(), b"FLV\x01");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_receives_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("played");
        let cmd = format!("cat > {}", path.display());

        let mut sink = Sink::open(SinkTarget::Player, false, &cmd).await.unwrap();
        assert!(!sink.shows_progress());
        sink.write_all(b"hello").await.unwrap();

        // Let cat drain its stdin before the player is killed
        if let Sink::Player { stdin, child } = sink {
            drop(stdin);
            let mut child = child;
            child.wait().await.unwrap();
        }

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }
}
