//! Registry error types

use std::io;

use crate::error::ConfigError;

use super::entry::WorkerId;

/// Error type for registry operations
#[derive(Debug)]
pub enum RegistryError {
    /// Supervision listener could not be set up
    Listen(io::Error),
    /// Worker process could not be started
    Spawn(io::Error),
    /// Request could not be handed to the worker
    Encode(ConfigError),
    /// Worker sent no status within the rendezvous timeout
    RendezvousTimeout(WorkerId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Listen(e) => write!(f, "Unable to open supervision channel: {}", e),
            RegistryError::Spawn(e) => write!(f, "Unable to start worker: {}", e),
            RegistryError::Encode(e) => write!(f, "{}", e),
            RegistryError::RendezvousTimeout(id) => {
                write!(f, "Worker {} did not report a status in time", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Listen(e) | RegistryError::Spawn(e) => Some(e),
            RegistryError::Encode(e) => Some(e),
            RegistryError::RendezvousTimeout(_) => None,
        }
    }
}

impl From<ConfigError> for RegistryError {
    fn from(e: ConfigError) -> Self {
        RegistryError::Encode(e)
    }
}
