//! Registry tests against real worker processes

use std::path::Path;
use std::time::Duration;

use lsmgr::registry::{RegistryConfig, Selection, StreamRegistry, WorkerInfo};
use lsmgr::worker::{StreamRequest, WorkerStatus};

fn registry() -> StreamRegistry {
    let config = RegistryConfig::with_program(env!("CARGO_BIN_EXE_lsmgr"))
        .kill_timeout(Duration::from_secs(5))
        .rendezvous_timeout(Duration::from_secs(10));
    StreamRegistry::with_config(config)
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Reap until `id` leaves the registry
async fn wait_for_exit(registry: &mut StreamRegistry, id: u32) -> WorkerInfo {
    for _ in 0..100 {
        if let Some(info) = registry.reap().into_iter().find(|info| info.id == id) {
            return info;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("worker {} never exited", id);
}

#[tokio::test]
async fn test_file_is_copied_then_finished() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("clip.flv");
    let output = dir.path().join("copy.flv");
    std::fs::write(&source, b"0123456789").unwrap();

    let mut registry = registry();
    let request = StreamRequest::new(file_url(&source))
        .quality("source")
        .output(&output);
    let id = registry.create(request).await.unwrap();
    assert_eq!(id, 1);

    let info = wait_for_exit(&mut registry, id).await;
    assert_eq!(info.status, WorkerStatus::Finished);
    assert_eq!(std::fs::read(&output).unwrap(), b"0123456789");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_discovery_reports_qualities() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("720p.flv"), b"a").unwrap();
    std::fs::write(dir.path().join("240p.flv"), b"b").unwrap();

    let mut registry = registry();
    let id = registry
        .create(StreamRequest::new(file_url(dir.path())))
        .await
        .unwrap();

    let info = registry.get(id).unwrap();
    assert_eq!(info.status, WorkerStatus::Failed);
    let failure = info.failure.unwrap();
    assert_eq!(failure.qualities, vec!["240p", "720p"]);

    let info = wait_for_exit(&mut registry, id).await;
    assert_eq!(info.status, WorkerStatus::Failed);
}

#[tokio::test]
async fn test_existing_output_fails_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("clip.flv");
    let output = dir.path().join("taken.flv");
    std::fs::write(&source, b"data").unwrap();
    std::fs::write(&output, b"keep me").unwrap();

    let mut registry = registry();
    let request = StreamRequest::new(file_url(&source))
        .quality("source")
        .output(&output);
    let id = registry.create(request).await.unwrap();

    assert_eq!(registry.get(id).unwrap().status, WorkerStatus::Failed);
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");
}

#[cfg(unix)]
#[tokio::test]
async fn test_kill_running_workers() {
    let mut registry = registry();

    let mut ids = Vec::new();
    for _ in 0..2 {
        let mut request = StreamRequest::new("file:///dev/zero")
            .quality("source")
            .output("/dev/null");
        request.force = true;
        ids.push(registry.create(request).await.unwrap());
    }
    assert_eq!(ids, vec![1, 2]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(registry.has_active());
    assert!(registry
        .list()
        .iter()
        .all(|info| info.status == WorkerStatus::Running));

    let report = registry.kill(&Selection::Ids(vec![2, 9, 1])).await;
    let killed: Vec<_> = report.killed.iter().map(|info| (info.id, info.status)).collect();
    assert_eq!(
        killed,
        vec![(1, WorkerStatus::Killed), (2, WorkerStatus::Killed)]
    );
    assert_eq!(report.unknown, vec![9]);

    assert!(!registry.has_active());
    assert!(registry.reap().is_empty());
}

#[tokio::test]
async fn test_cmdline_request_reports_command() {
    let mut registry = registry();
    let mut request = StreamRequest::new("rtmp://host/app/key").quality("live");
    request.cmdline = true;
    let id = registry.create(request).await.unwrap();

    let info = registry.get(id).unwrap();
    assert_eq!(info.status, WorkerStatus::Finished);
    assert_eq!(info.cmdline.as_deref(), Some("rtmpdump -r rtmp://host/app/key --flv -"));
    assert!(!registry.has_active());

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("clip.flv");
    std::fs::write(&source, b"data").unwrap();
    let mut request = StreamRequest::new(file_url(&source)).quality("source");
    request.cmdline = true;
    let id = registry.create(request).await.unwrap();

    let info = registry.get(id).unwrap();
    assert_eq!(info.status, WorkerStatus::Failed);
    assert_eq!(info.cmdline, None);
    assert_eq!(info.failure.unwrap().reason, "Stream does not use a command-line");
}

#[cfg(unix)]
#[tokio::test]
async fn test_reap_is_idempotent() {
    let mut registry = registry();
    for _ in 0..2 {
        let mut request = StreamRequest::new("file:///dev/zero")
            .quality("source")
            .output("/dev/null");
        request.force = true;
        registry.create(request).await.unwrap();
    }

    let ids = |registry: &mut StreamRegistry| -> Vec<u32> {
        registry.list().iter().map(|info| info.id).collect()
    };
    let before = ids(&mut registry);
    assert_eq!(before, vec![1, 2]);

    assert!(registry.reap().is_empty());
    assert_eq!(ids(&mut registry), before);
    assert!(registry.reap().is_empty());
    assert_eq!(ids(&mut registry), before);

    let report = registry.kill(&Selection::All).await;
    assert_eq!(report.killed.len(), 2);
    assert!(registry.is_empty());
}
