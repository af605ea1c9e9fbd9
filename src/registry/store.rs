//! Stream registry implementation
//!
//! Owns every worker process started by the shell. All methods take
//! `&mut self`: the registry lives on the shell's single task and is never
//! shared.

use std::collections::{BTreeMap, BTreeSet};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinSet;

use crate::channel::{ChannelError, ControlMessage, Failure, SupervisionChannel, SupervisionListener};
use crate::worker::process::encode_request;
use crate::worker::{StreamRequest, WorkerStatus, REQUEST_ENV};

use super::config::RegistryConfig;
use super::entry::{KillReport, Selection, WorkerEntry, WorkerId, WorkerInfo};
use super::error::RegistryError;

/// How the start-up rendezvous ended
enum Handshake {
    Reported(SupervisionChannel, ControlMessage),
    Disconnected(Option<SupervisionChannel>, Option<ChannelError>),
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

/// Table of worker processes keyed by identifier
pub struct StreamRegistry {
    /// Tracked workers, in identifier order
    workers: BTreeMap<WorkerId, WorkerEntry>,

    /// Next identifier to hand out
    next_id: WorkerId,

    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            workers: BTreeMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start a worker for `request` and wait for its first status.
    ///
    /// The worker is tracked whether it reports `Started` or `Failed`; it
    /// leaves the registry once [`reap`](Self::reap) sees its process exit.
    pub async fn create(&mut self, request: StreamRequest) -> Result<WorkerId, RegistryError> {
        let id = self.next_id;
        self.next_id += 1;

        let listener = SupervisionListener::bind()
            .await
            .map_err(RegistryError::Listen)?;
        let addr = listener.local_addr().map_err(RegistryError::Listen)?;

        let mut command = Command::new(&self.config.worker_program);
        command
            .args(&self.config.worker_args)
            .arg("--id")
            .arg(id.to_string())
            .arg("--channel")
            .arg(addr.to_string())
            .env(REQUEST_ENV, encode_request(&request)?)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Keep terminal interrupts away from workers
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(RegistryError::Spawn)?;
        tracing::debug!(worker = id, pid = ?child.id(), url = %request.url, "Worker spawned");

        let handshake = self.rendezvous(&listener, &mut child).await;

        let mut cmdline = None;
        let (status, failure, channel) = match handshake {
            Handshake::Reported(channel, ControlMessage::Started) => {
                (WorkerStatus::Running, None, Some(channel))
            }
            Handshake::Reported(channel, ControlMessage::Failed(failure)) => {
                // The worker exits right after reporting; let it go before
                // the shell asks whether anything is still running.
                self.await_exit(id, &mut child).await;
                (WorkerStatus::Failed, Some(failure), Some(channel))
            }
            Handshake::Reported(channel, ControlMessage::CommandLine(line)) => {
                self.await_exit(id, &mut child).await;
                cmdline = Some(line);
                (WorkerStatus::Finished, None, Some(channel))
            }
            Handshake::Reported(channel, ControlMessage::Kill) => (
                WorkerStatus::Failed,
                Some(Failure::new("Worker sent an unexpected message")),
                Some(channel),
            ),
            Handshake::Disconnected(channel, error) => {
                if let Some(e) = error {
                    tracing::debug!(worker = id, error = %e, "Supervision channel broken");
                }
                (
                    WorkerStatus::Failed,
                    Some(Failure::new("Worker exited without reporting a status")),
                    channel,
                )
            }
            Handshake::Exited(status) => {
                let reason = match status {
                    Ok(status) => format!("Worker exited without reporting a status ({})", status),
                    Err(e) => format!("Lost track of worker process: {}", e),
                };
                (WorkerStatus::Failed, Some(Failure::new(reason)), None)
            }
            Handshake::TimedOut => {
                tracing::warn!(worker = id, "Worker did not report in time, killing it");
                force_kill(id, &mut child).await;
                return Err(RegistryError::RendezvousTimeout(id));
            }
        };

        tracing::info!(
            worker = id,
            url = %request.url,
            status = %status,
            "Worker registered"
        );

        self.workers.insert(
            id,
            WorkerEntry {
                id,
                request,
                child,
                channel,
                status,
                failure,
                cmdline,
            },
        );

        Ok(id)
    }

    /// Give a worker that is done without streaming a moment to exit
    async fn await_exit(&self, id: WorkerId, child: &mut Child) {
        match tokio::time::timeout(self.config.failed_exit_grace, child.wait()).await {
            Ok(Ok(status)) => tracing::trace!(worker = id, %status, "Worker exited"),
            Ok(Err(e)) => tracing::debug!(worker = id, error = %e, "Unable to wait for worker"),
            Err(_) => tracing::debug!(
                worker = id,
                grace_secs = self.config.failed_exit_grace.as_secs_f32(),
                "Worker still running after reporting"
            ),
        }
    }

    /// Wait for the worker's connection and first message, or its exit
    async fn rendezvous(&self, listener: &SupervisionListener, child: &mut Child) -> Handshake {
        let wait = async {
            tokio::select! {
                biased;
                handshake = first_message(listener) => handshake,
                status = child.wait() => Handshake::Exited(status),
            }
        };

        match self.config.rendezvous_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(Handshake::TimedOut),
            None => wait.await,
        }
    }

    /// Drop workers whose process has exited and return them with their
    /// final status. Never blocks.
    pub fn reap(&mut self) -> Vec<WorkerInfo> {
        let mut exited = Vec::new();

        for (id, entry) in self.workers.iter_mut() {
            match entry.child.try_wait() {
                Ok(Some(status)) => {
                    entry.status = final_status(entry.status, status.code());
                    exited.push(*id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(worker = id, error = %e, "Unable to poll worker process");
                }
            }
        }

        exited
            .into_iter()
            .filter_map(|id| self.workers.remove(&id))
            .map(|entry| {
                tracing::debug!(worker = entry.id, status = %entry.status, "Worker reaped");
                entry.info()
            })
            .collect()
    }

    /// Reap, then snapshot the remaining workers in identifier order
    pub fn list(&mut self) -> Vec<WorkerInfo> {
        self.reap();
        self.workers.values().map(WorkerEntry::info).collect()
    }

    /// Snapshot of one worker, without reaping
    pub fn get(&self, id: WorkerId) -> Option<WorkerInfo> {
        self.workers.get(&id).map(WorkerEntry::info)
    }

    /// Split a selection into tracked workers and unknown identifiers
    pub fn select(&self, selection: &Selection) -> (Vec<WorkerInfo>, Vec<WorkerId>) {
        match selection {
            Selection::All => (self.workers.values().map(WorkerEntry::info).collect(), Vec::new()),
            Selection::Ids(ids) => {
                let ids: BTreeSet<WorkerId> = ids.iter().copied().collect();
                let (known, unknown): (Vec<WorkerId>, Vec<WorkerId>) =
                    ids.into_iter().partition(|id| self.workers.contains_key(id));
                let known = known
                    .into_iter()
                    .filter_map(|id| self.get(id))
                    .collect();
                (known, unknown)
            }
        }
    }

    /// Stop the selected workers and wait for them to exit.
    ///
    /// Every target is sent `Kill` before any of them is waited on. A worker
    /// still running after the kill timeout is force-killed. Unknown
    /// identifiers are reported and otherwise ignored.
    pub async fn kill(&mut self, selection: &Selection) -> KillReport {
        let (targets, unknown) = self.select(selection);

        let mut entries: Vec<WorkerEntry> = targets
            .iter()
            .filter_map(|info| self.workers.remove(&info.id))
            .collect();

        for entry in entries.iter_mut() {
            if let Some(channel) = entry.channel.as_mut() {
                if let Err(e) = channel.send(&ControlMessage::Kill).await {
                    tracing::debug!(worker = entry.id, error = %e, "Kill not delivered");
                }
            }
        }

        let timeout = self.config.kill_timeout;
        let mut joins = JoinSet::new();
        for entry in entries {
            joins.spawn(join_worker(entry, timeout));
        }

        let mut killed = Vec::new();
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok(info) => killed.push(info),
                Err(e) => tracing::warn!(error = %e, "Worker join task failed"),
            }
        }
        killed.sort_by_key(|info| info.id);

        for id in &unknown {
            tracing::debug!(worker = id, "Kill requested for unknown worker");
        }

        KillReport { killed, unknown }
    }

    /// Reap, then report whether any worker is still tracked
    pub fn has_active(&mut self) -> bool {
        self.reap();
        !self.workers.is_empty()
    }

    /// Number of tracked workers, without reaping
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn first_message(listener: &SupervisionListener) -> Handshake {
    let mut channel = match listener.accept().await {
        Ok(channel) => channel,
        Err(e) => return Handshake::Disconnected(None, Some(e.into())),
    };

    match channel.recv().await {
        Ok(Some(msg)) => Handshake::Reported(channel, msg),
        Ok(None) => Handshake::Disconnected(Some(channel), None),
        Err(e) => Handshake::Disconnected(Some(channel), Some(e)),
    }
}

/// Wait for a killed worker, force-killing it after `timeout`
async fn join_worker(mut entry: WorkerEntry, timeout: Duration) -> WorkerInfo {
    match tokio::time::timeout(timeout, entry.child.wait()).await {
        Ok(Ok(status)) => {
            entry.status = final_status(entry.status, status.code());
        }
        Ok(Err(e)) => {
            tracing::warn!(worker = entry.id, error = %e, "Unable to wait for worker");
            entry.status = WorkerStatus::Killed;
        }
        Err(_) => {
            tracing::warn!(
                worker = entry.id,
                timeout_secs = timeout.as_secs_f32(),
                "Worker ignored kill, terminating it"
            );
            force_kill(entry.id, &mut entry.child).await;
            entry.status = WorkerStatus::Killed;
        }
    }

    tracing::info!(worker = entry.id, status = %entry.status, "Worker stopped");
    entry.info()
}

/// Kill a worker together with its players and stream programs.
///
/// Workers lead their own process group, so on unix the whole group is
/// signalled before the worker itself is killed and reaped.
async fn force_kill(id: WorkerId, child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: killpg only sends a signal; the group id is the pid of a
            // child we have not reaped yet, so it cannot have been recycled.
            let ret = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
            if ret != 0 {
                let e = std::io::Error::last_os_error();
                tracing::debug!(worker = id, pid, error = %e, "Unable to signal worker process group");
            }
        }
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(worker = id, error = %e, "Worker already gone");
    }
}

/// A failure reported at start-up sticks; otherwise the exit code decides
fn final_status(current: WorkerStatus, code: Option<i32>) -> WorkerStatus {
    if current == WorkerStatus::Failed {
        WorkerStatus::Failed
    } else {
        WorkerStatus::from_exit_code(code)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn sh(script: &str) -> RegistryConfig {
        RegistryConfig::with_program("sh")
            .worker_args(["-c", script])
            .kill_timeout(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut registry =
            StreamRegistry::with_config(RegistryConfig::with_program("lsmgr-no-such-worker"));

        let result = registry.create(StreamRequest::new("file:///x")).await;
        assert!(matches!(result, Err(RegistryError::Spawn(_))));
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_exit_is_failure() {
        let mut registry = StreamRegistry::with_config(sh("exit 0"));

        let id = registry.create(StreamRequest::new("file:///x")).await.unwrap();
        let info = registry.get(id).unwrap();
        assert_eq!(info.status, WorkerStatus::Failed);
        assert!(info.failure.is_some());

        // Reported failures survive a clean exit code
        let reaped = registry.reap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].status, WorkerStatus::Failed);
        assert!(!registry.has_active());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let mut registry = StreamRegistry::with_config(sh("exit 1"));

        let first = registry.create(StreamRequest::new("a")).await.unwrap();
        registry.reap();
        let second = registry.create(StreamRequest::new("b")).await.unwrap();
        assert!(second > first);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rendezvous_timeout_kills_worker() {
        let mut registry =
            StreamRegistry::with_config(sh("sleep 30").rendezvous_timeout(Duration::from_millis(200)));

        let started = Instant::now();
        let result = registry.create(StreamRequest::new("a")).await;
        assert!(matches!(result, Err(RegistryError::RendezvousTimeout(1))));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(registry.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_lingering_failed_worker_is_kept() {
        // Reports Failed with an empty reason, then does not exit
        let script = r#"addr=$3
exec 3<>/dev/tcp/${addr%:*}/${addr##*:}
printf '\0\0\0\5\2\0\0\0\0' >&3
sleep 30"#;
        let mut config = RegistryConfig::with_program("bash")
            .worker_args(["-c", script])
            .kill_timeout(Duration::from_millis(300));
        config.failed_exit_grace = Duration::from_millis(200);
        let mut registry = StreamRegistry::with_config(config);

        let started = Instant::now();
        let id = registry.create(StreamRequest::new("a")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(registry.get(id).unwrap().status, WorkerStatus::Failed);
        assert!(registry.has_active());

        let report = registry.kill(&Selection::All).await;
        assert_eq!(report.killed.len(), 1);
        assert!(registry.is_empty());
    }

    /// Pid of `pid_file`'s process once it is written
    #[cfg(target_os = "linux")]
    async fn read_pid(pid_file: &std::path::Path) -> u32 {
        for _ in 0..100 {
            if let Ok(text) = std::fs::read_to_string(pid_file) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("pid file never written");
    }

    /// Running and not a zombie
    #[cfg(target_os = "linux")]
    fn is_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map(|rest| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_force_kill_takes_worker_children() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("player.pid");

        // Reports Started, starts a long-lived child, then never reads Kill
        let script = format!(
            r#"addr=$3
exec 3<>/dev/tcp/${{addr%:*}}/${{addr##*:}}
printf '\0\0\0\1\1' >&3
sleep 300 &
echo $! > {}
while true; do sleep 1; done"#,
            pid_file.display()
        );
        let config = RegistryConfig::with_program("bash")
            .worker_args(["-c", script.as_str()])
            .kill_timeout(Duration::from_millis(500));
        let mut registry = StreamRegistry::with_config(config);

        let id = registry.create(StreamRequest::new("a")).await.unwrap();
        assert_eq!(registry.get(id).unwrap().status, WorkerStatus::Running);
        let player = read_pid(&pid_file).await;
        assert!(is_alive(player));

        let report = registry.kill(&Selection::All).await;
        assert_eq!(report.killed.len(), 1);
        assert_eq!(report.killed[0].status, WorkerStatus::Killed);

        let mut gone = false;
        for _ in 0..100 {
            if !is_alive(player) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "child {} survived its worker", player);
    }

    #[tokio::test]
    async fn test_kill_unknown_ids_only() {
        let mut registry = StreamRegistry::new();

        let report = registry.kill(&Selection::Ids(vec![7, 3, 7])).await;
        assert!(report.killed.is_empty());
        assert_eq!(report.unknown, vec![3, 7]);

        let report = registry.kill(&Selection::All).await;
        assert_eq!(report, KillReport::default());
    }

    #[test]
    fn test_final_status() {
        assert_eq!(
            final_status(WorkerStatus::Running, Some(0)),
            WorkerStatus::Finished
        );
        assert_eq!(final_status(WorkerStatus::Running, None), WorkerStatus::Killed);
        assert_eq!(
            final_status(WorkerStatus::Failed, Some(0)),
            WorkerStatus::Failed
        );
    }
}
