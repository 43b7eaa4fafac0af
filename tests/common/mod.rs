#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use procvisor::{Config, Event, EventKind, LogRecord, MetricRecord, Sink};
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(10);

/// Script root and target name of the crate's worker binary.
pub fn worker_bin() -> (PathBuf, String) {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_procvisor-worker"));
    let root = bin.parent().expect("binary has a parent dir").to_path_buf();
    let name = bin
        .file_name()
        .expect("binary has a file name")
        .to_string_lossy()
        .into_owned();
    (root, name)
}

pub fn config(status_interval: Duration) -> Config {
    let (root, _) = worker_bin();
    Config {
        namespace: "test".into(),
        status_interval,
        ..Config::default().with_script_root(root)
    }
}

/// Sink recording everything it receives.
#[derive(Default)]
pub struct Captured {
    pub logs: Mutex<Vec<(String, LogRecord)>>,
    pub metrics: Mutex<Vec<(String, MetricRecord)>>,
}

impl Sink for Captured {
    fn log(&self, source: &str, record: &LogRecord) {
        self.logs.lock().push((source.to_string(), record.clone()));
    }

    fn metric(&self, source: &str, record: &MetricRecord) {
        self.metrics.lock().push((source.to_string(), record.clone()));
    }
}

/// Polls `check` until it holds or `WAIT` elapses.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Next lifecycle event of `kind`, skipping others.
pub async fn next_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == kind => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind:?} event within {WAIT:?}"))
}

pub fn shared(captured: &Arc<Captured>) -> Arc<dyn Sink> {
    Arc::clone(captured) as Arc<dyn Sink>
}
