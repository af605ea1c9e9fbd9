//! Registry configuration

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Sub-command that puts the binary in worker mode
pub const WORKER_SUBCOMMAND: &str = "worker";

/// How workers are spawned and how long the registry waits on them
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Program executed for each worker
    pub worker_program: PathBuf,

    /// Arguments placed before `--id <n> --channel <addr>`
    pub worker_args: Vec<OsString>,

    /// How long a killed worker may take to exit before it is force-killed
    pub kill_timeout: Duration,

    /// Limit on the wait for a worker's first status (None = wait forever)
    pub rendezvous_timeout: Option<Duration>,

    /// How long to wait for a worker that reported `Failed` to exit
    pub failed_exit_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let worker_program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("lsmgr"));
        Self {
            worker_program,
            worker_args: vec![OsString::from(WORKER_SUBCOMMAND)],
            kill_timeout: Duration::from_secs(10),
            rendezvous_timeout: None,
            failed_exit_grace: Duration::from_secs(1),
        }
    }
}

impl RegistryConfig {
    /// Run workers from `program` (the `worker` sub-command is kept)
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            worker_program: program.into(),
            ..Default::default()
        }
    }

    /// Replace the leading worker arguments
    pub fn worker_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the kill timeout
    pub fn kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Bound the start-up rendezvous
    pub fn rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = Some(timeout);
        self
    }
}
