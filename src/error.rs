//! Error types
//!
//! Each subsystem has its own error enum; [`Error`] wraps them for callers
//! that cross subsystem boundaries (the shell and the binary).

use std::fmt;
use std::io;

pub use crate::channel::ChannelError;
pub use crate::registry::RegistryError;
pub use crate::resolver::{ResolveError, StreamError};

/// Result alias using the crate-wide [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error
#[derive(Debug)]
pub enum Error {
    /// I/O failure outside a more specific subsystem
    Io(io::Error),
    /// Supervision channel failure
    Channel(ChannelError),
    /// URL resolution or plugin failure
    Resolve(ResolveError),
    /// Stream open failure
    Stream(StreamError),
    /// Worker registry failure
    Registry(RegistryError),
    /// Invalid configuration value
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Channel(e) => write!(f, "Channel error: {}", e),
            Error::Resolve(e) => write!(f, "{}", e),
            Error::Stream(e) => write!(f, "{}", e),
            Error::Registry(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Channel(e) => Some(e),
            Error::Resolve(e) => Some(e),
            Error::Stream(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Config(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::Channel(e)
    }
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        Error::Resolve(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Port range lower bound is below the allowed minimum
    PortBelowMinimum(u16),
    /// Port range bounds are not ordered
    InvalidPortRange { min: u16, max: u16 },
    /// Log level name not recognised
    UnknownLogLevel(String),
    /// Worker request could not be read from the environment
    InvalidRequest(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::PortBelowMinimum(port) => write!(
                f,
                "port {} is below the minimum of {}",
                port,
                crate::ports::MIN_ALLOWED_PORT
            ),
            ConfigError::InvalidPortRange { min, max } => {
                write!(f, "minimum port {} must be lower than maximum port {}", min, max)
            }
            ConfigError::UnknownLogLevel(level) => write!(
                f,
                "unknown log level '{}', valid levels: none, error, warning, info, debug",
                level
            ),
            ConfigError::InvalidRequest(msg) => write!(f, "invalid worker request: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
