mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use procvisor::{
    Config, Event, EventKind, ExitValue, RestartPolicy, RuntimeError, Scripts, Subscribe,
    WorkerManager, WorkerSpec,
};
use serde_json::{Value, json};

use common::{WAIT, config, next_event, worker_bin};

fn manager(cfg: Config, specs: Vec<WorkerSpec>) -> WorkerManager {
    let scripts = Scripts::new(&cfg).unwrap();
    WorkerManager::new(cfg, scripts, specs)
}

#[tokio::test]
async fn starts_every_worker_and_stops_them_cleanly() {
    let (_, target) = worker_bin();
    let specs = (0..3).map(|_| WorkerSpec::new(&target)).collect();
    let mgr = manager(config(Duration::from_secs(60)), specs);
    let mut rx = mgr.bus().subscribe();

    mgr.start().await.unwrap();
    for _ in 0..3 {
        next_event(&mut rx, EventKind::WorkerStarting).await;
    }
    let workers: Vec<_> = mgr.workers().into_iter().flatten().collect();
    assert_eq!(workers.len(), 3);
    for worker in &workers {
        let out: i64 = worker.call_value("Test", "echo", vec![json!(1)]).await.unwrap();
        assert_eq!(out, 1);
    }

    mgr.stop().await.unwrap();
    next_event(&mut rx, EventKind::AllStopped).await;
    for worker in &workers {
        assert_eq!(worker.exit_value(), Some(ExitValue::Code(0)));
    }
    assert!(mgr.workers().iter().all(Option::is_none));

    // A second stop is a no-op.
    mgr.stop().await.unwrap();
}

#[tokio::test]
async fn uptime_limit_restarts_worker() {
    let (_, target) = worker_bin();
    let spec = WorkerSpec::new(&target).with_uptime_limit("PT0S");
    let mgr = manager(config(Duration::from_millis(100)), vec![spec]);
    let mut rx = mgr.bus().subscribe();

    mgr.start().await.unwrap();
    let first = next_event(&mut rx, EventKind::WorkerStarting).await;
    assert_eq!(first.attempt, Some(0));

    let exceeded = next_event(&mut rx, EventKind::UptimeExceeded).await;
    assert_eq!(exceeded.slot, Some(0));
    let exited = next_event(&mut rx, EventKind::WorkerExited).await;
    assert_eq!(exited.process, first.process);

    let second = next_event(&mut rx, EventKind::WorkerStarting).await;
    assert_eq!(second.attempt, Some(1));
    assert_ne!(second.process, first.process);

    mgr.stop().await.unwrap();
}

#[tokio::test]
async fn restart_limit_leaves_slot_empty() {
    let (_, target) = worker_bin();
    let spec = WorkerSpec::new(&target).with_restart(RestartPolicy::limited(1));
    let mgr = manager(config(Duration::from_secs(60)), vec![spec]);
    let mut rx = mgr.bus().subscribe();

    mgr.start().await.unwrap();
    next_event(&mut rx, EventKind::WorkerStarting).await;

    for attempt in 0..2 {
        let worker = mgr.worker(0).expect("slot is occupied");
        worker.call_value::<Value>("Test", "exit", vec![json!(2)]).await.unwrap();
        let exited = next_event(&mut rx, EventKind::WorkerExited).await;
        assert_eq!(exited.reason.as_deref(), Some("2"));
        if attempt == 0 {
            let restarted = next_event(&mut rx, EventKind::WorkerStarting).await;
            assert_eq!(restarted.attempt, Some(1));
        }
    }

    let exhausted = next_event(&mut rx, EventKind::RestartsExhausted).await;
    assert_eq!(exhausted.attempt, Some(1));
    assert!(mgr.worker(0).is_none());

    mgr.stop().await.unwrap();
}

#[tokio::test]
async fn stop_worker_by_name() {
    let (_, target) = worker_bin();
    let mgr = manager(config(Duration::from_secs(60)), vec![WorkerSpec::new(&target)]);

    mgr.start().await.unwrap();
    let exit = mgr.stop_worker(&target).await.unwrap();
    assert_eq!(exit, Some(ExitValue::Code(0)));
    assert!(mgr.worker(0).is_none());
    assert_eq!(mgr.stop_worker(&target).await.unwrap(), None);

    let err = mgr.stop_worker("missing").await.unwrap_err();
    assert!(matches!(err, RuntimeError::WorkerNotFound { .. }), "{err}");

    mgr.stop().await.unwrap();
}

#[tokio::test]
async fn start_rejects_bad_specs_without_forking() {
    let (_, target) = worker_bin();

    let bad_limit = WorkerSpec::new(&target).with_uptime_limit("soon");
    let mgr = manager(config(Duration::from_secs(60)), vec![WorkerSpec::new(&target), bad_limit]);
    let err = mgr.start().await.unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidDuration { .. }), "{err}");
    assert!(mgr.workers().iter().all(Option::is_none));

    let mgr = manager(config(Duration::from_secs(60)), vec![WorkerSpec::new("no-such-script")]);
    let err = mgr.start().await.unwrap_err();
    assert!(matches!(err, RuntimeError::ScriptNotFound { .. }), "{err}");
}

#[tokio::test]
async fn second_start_is_rejected() {
    let (_, target) = worker_bin();
    let mgr = manager(config(Duration::from_secs(60)), vec![WorkerSpec::new(&target)]);

    mgr.start().await.unwrap();
    assert!(matches!(mgr.start().await, Err(RuntimeError::AlreadyStarted)));
    mgr.stop().await.unwrap();
    assert!(matches!(mgr.start().await, Err(RuntimeError::AlreadyStarted)));
}

#[tokio::test]
async fn stop_before_start_leaves_manager_startable() {
    let (_, target) = worker_bin();
    let mgr = manager(config(Duration::from_secs(60)), vec![WorkerSpec::new(&target)]);

    mgr.stop().await.unwrap();
    mgr.start().await.unwrap();
    assert!(mgr.worker(0).is_some());
    mgr.stop().await.unwrap();
}

/// Records the kinds of lifecycle events it sees.
#[derive(Default)]
struct Kinds(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, event: &Event) {
        self.0.lock().push(event.kind);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn failed_fork_rolls_back_and_start_can_be_retried() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.sh");
    let broken = dir.path().join("broken.sh");
    std::fs::write(&good, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&good, std::fs::Permissions::from_mode(0o755)).unwrap();
    // Present but not executable, so validation passes and the spawn fails.
    std::fs::write(&broken, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&broken, std::fs::Permissions::from_mode(0o644)).unwrap();

    let cfg = Config {
        grace: Some(Duration::from_millis(200)),
        ..Config::default().with_script_root(dir.path())
    };
    let kinds = Arc::new(Kinds::default());
    let mgr = manager(cfg, vec![WorkerSpec::new("good.sh"), WorkerSpec::new("broken.sh")])
        .with_subscribers(vec![Arc::clone(&kinds) as Arc<dyn Subscribe>]);
    let mut rx = mgr.bus().subscribe();

    let err = tokio::time::timeout(WAIT, mgr.start()).await.unwrap().unwrap_err();
    assert!(matches!(err, RuntimeError::Spawn { .. }), "{err}");
    assert!(mgr.workers().iter().all(Option::is_none));

    let forked = next_event(&mut rx, EventKind::WorkerStarting).await;
    let exited = next_event(&mut rx, EventKind::WorkerExited).await;
    assert_eq!(exited.slot, Some(0));
    assert_eq!(exited.process, forked.process);
    assert_eq!(exited.reason.as_deref(), Some("SIGKILL"));

    std::fs::set_permissions(&broken, std::fs::Permissions::from_mode(0o755)).unwrap();
    mgr.start().await.unwrap();
    assert!(mgr.workers().iter().all(Option::is_some));

    let _ = mgr.stop().await;
    assert!(kinds.0.lock().contains(&EventKind::WorkerStarting));
    assert!(kinds.0.lock().contains(&EventKind::AllStopped));
}

#[cfg(unix)]
#[tokio::test]
async fn grace_exceeded_force_kills_stuck_worker() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("stuck.sh");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let cfg = Config {
        grace: Some(Duration::from_millis(200)),
        ..Config::default().with_script_root(dir.path())
    };
    let mgr = manager(cfg, vec![WorkerSpec::new("stuck.sh")]);
    let mut rx = mgr.bus().subscribe();

    mgr.start().await.unwrap();
    let worker = mgr.worker(0).expect("slot is occupied");

    let err = tokio::time::timeout(WAIT, mgr.stop()).await.unwrap().unwrap_err();
    match err {
        RuntimeError::GraceExceeded { stuck, .. } => assert_eq!(stuck, vec![worker.name().to_string()]),
        other => panic!("unexpected {other}"),
    }
    next_event(&mut rx, EventKind::GraceExceeded).await;
    assert_eq!(worker.exit_value(), Some(ExitValue::Signal("SIGKILL".into())));
}
