//! Worker lifecycle states and process exit codes

use std::fmt;

use crate::channel::Failure;

/// Exit code of a worker that relayed until end of stream (or an I/O error)
pub const EXIT_FINISHED: i32 = 0;
/// Exit code of a worker that failed before streaming
pub const EXIT_FAILED: i32 = 1;
/// Exit code of a worker stopped by a kill request
pub const EXIT_KILLED: i32 = 3;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Spawned, first status message not received yet
    Starting,
    /// Reported `Started`, relaying
    Running,
    /// Reported `Failed`, or died without reporting
    Failed,
    /// Stream ended
    Finished,
    /// Stopped on request
    Killed,
}

impl WorkerStatus {
    /// Whether the worker can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Failed | WorkerStatus::Finished | WorkerStatus::Killed
        )
    }

    /// Final status from a process exit code. `None` means the process was
    /// terminated by a signal.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_FINISHED) => WorkerStatus::Finished,
            Some(EXIT_KILLED) | None => WorkerStatus::Killed,
            Some(_) => WorkerStatus::Failed,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Failed => "failed",
            WorkerStatus::Finished => "finished",
            WorkerStatus::Killed => "killed",
        };
        f.write_str(name)
    }
}

/// How a worker's job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Finished,
    Killed,
    Failed(Failure),
}

impl WorkerOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerOutcome::Finished => EXIT_FINISHED,
            WorkerOutcome::Killed => EXIT_KILLED,
            WorkerOutcome::Failed(_) => EXIT_FAILED,
        }
    }

    pub fn status(&self) -> WorkerStatus {
        match self {
            WorkerOutcome::Finished => WorkerStatus::Finished,
            WorkerOutcome::Killed => WorkerStatus::Killed,
            WorkerOutcome::Failed(_) => WorkerStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_map_back_to_status() {
        for outcome in [
            WorkerOutcome::Finished,
            WorkerOutcome::Killed,
            WorkerOutcome::Failed(Failure::new("x")),
        ] {
            assert_eq!(
                WorkerStatus::from_exit_code(Some(outcome.exit_code())),
                outcome.status()
            );
        }
    }

    #[test]
    fn test_unexpected_exits() {
        assert_eq!(WorkerStatus::from_exit_code(None), WorkerStatus::Killed);
        assert_eq!(WorkerStatus::from_exit_code(Some(101)), WorkerStatus::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!WorkerStatus::Starting.is_terminal());
        assert!(!WorkerStatus::Running.is_terminal());
        assert!(WorkerStatus::Failed.is_terminal());
        assert!(WorkerStatus::Killed.is_terminal());
        assert_eq!(WorkerStatus::Running.to_string(), "running");
    }
}
