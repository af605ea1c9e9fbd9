//! Resolver error types

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error type for URL resolution and quality listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No plugin accepts the URL
    NoPluginFound(String),
    /// The plugin matched but could not list streams
    Plugin(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NoPluginFound(url) => write!(f, "No plugin can handle URL: {}", url),
            ResolveError::Plugin(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Error type for opening a stream
#[derive(Debug)]
pub enum StreamError {
    /// Stream program is not installed
    CommandNotFound(String),
    /// Stream program lacks an argument the stream needs
    Unsupported { program: String, flag: String },
    /// Stream program's help could not be read
    Compatibility { program: String, error: io::Error },
    /// Stream program exited right after starting
    ProcessExited { program: String, errorlog: Option<PathBuf> },
    /// HTTP request failed
    Http(String),
    /// Any other I/O failure
    Io(io::Error),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::CommandNotFound(program) => {
                write!(f, "Unable to find {} command", program)
            }
            StreamError::Unsupported { program, flag } => {
                write!(f, "Installed {} does not support {} argument", program, flag)
            }
            StreamError::Compatibility { program, error } => {
                write!(f, "Error while checking {} compatibility: {}", program, error)
            }
            StreamError::ProcessExited {
                program,
                errorlog: Some(path),
            } => write!(
                f,
                "Error while executing {}, error output logged to: {}",
                program,
                path.display()
            ),
            StreamError::ProcessExited {
                program,
                errorlog: None,
            } => write!(f, "Error while executing {}", program),
            StreamError::Http(msg) => write!(f, "HTTP error: {}", msg),
            StreamError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        StreamError::Io(e)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        StreamError::Http(e.to_string())
    }
}
