//! Worker entry and snapshot types
//!
//! This module defines the per-worker state stored in the registry.

use tokio::process::Child;

use crate::channel::{Failure, SupervisionChannel};
use crate::worker::{StreamRequest, WorkerStatus};

/// Worker identifier, assigned in increasing order and never reused
pub type WorkerId = u32;

/// Entry for a single worker in the registry
pub struct WorkerEntry {
    pub id: WorkerId,

    /// Request the worker was started with
    pub request: StreamRequest,

    /// Worker process
    pub(super) child: Child,

    /// Shell end of the supervision channel (None if the worker never connected)
    pub(super) channel: Option<SupervisionChannel>,

    /// Last known status
    pub status: WorkerStatus,

    /// Failure reported by the worker
    pub failure: Option<Failure>,

    /// Command line reported instead of streaming
    pub cmdline: Option<String>,
}

impl WorkerEntry {
    /// Point-in-time view for display
    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            url: self.request.url.clone(),
            quality: self.request.quality.clone(),
            port: self.request.display_port(),
            status: self.status,
            failure: self.failure.clone(),
            cmdline: self.cmdline.clone(),
        }
    }
}

/// Snapshot of a worker, detached from its process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub url: String,
    pub quality: Option<String>,
    /// Port used by the player, if its command needs one
    pub port: Option<u16>,
    pub status: WorkerStatus,
    pub failure: Option<Failure>,
    pub cmdline: Option<String>,
}

/// Workers addressed by a kill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every tracked worker
    All,
    /// The given identifiers
    Ids(Vec<WorkerId>),
}

/// Result of a kill
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillReport {
    /// Workers that were stopped, in identifier order, with their final status
    pub killed: Vec<WorkerInfo>,
    /// Requested identifiers that are not tracked
    pub unknown: Vec<WorkerId>,
}
