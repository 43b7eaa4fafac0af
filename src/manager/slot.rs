//! # SlotActor: supervision loop of one worker slot.
//!
//! ```text
//! start() forks the first process, then SlotActor::run():
//!
//! loop {
//!   ├─► watch(process):
//!   │     ├─ status {uptime} > limit ─► publish UptimeExceeded, process.kill()
//!   │     ├─ exit                    ─► publish WorkerExited, slot = None
//!   │     └─ token cancelled         ─► return (stop owns the process now)
//!   ├─► restart.allows(restarts)?   no ─► publish RestartsExhausted, return
//!   ├─► publish RestartScheduled{attempt, delay}; sleep(delay) (cancellable)
//!   └─► scripts.fork(spec)
//!         ├─ Ok  ─► slot = Some(new), publish WorkerStarting{attempt}
//!         └─ Err ─► publish WorkerDead, return
//! }
//! ```
//!
//! ## Rules
//! - Only this loop replaces the slot's handle, and never after its token is cancelled.
//! - The restart counter only grows; it is never reset by a long-lived process.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::child::{ProcessStatus, STATUS_EVENT};
use crate::events::{Bus, Event, EventKind};
use crate::manager::spec::WorkerSpec;
use crate::policies::RestartPolicy;
use crate::script::{ExitValue, ScriptProcess, Scripts};

/// Arena of worker slots, indexed by spec position.
pub(crate) type Slots = Arc<RwLock<Vec<Option<Arc<ScriptProcess>>>>>;

/// Supervises the processes forked into one slot.
pub(crate) struct SlotActor {
    pub index: usize,
    pub spec: Arc<WorkerSpec>,
    /// Parsed uptime limit in seconds.
    pub uptime_limit: Option<f64>,
    pub restart: RestartPolicy,
    pub scripts: Arc<Scripts>,
    pub slots: Slots,
    pub bus: Bus,
}

impl SlotActor {
    /// Forks the slot's script and places it in the slot.
    pub fn fork(&self, attempt: u32) -> Result<Arc<ScriptProcess>, crate::RuntimeError> {
        let process = Arc::new(self.scripts.fork(&self.spec.name, &self.spec.args)?);
        self.slots.write()[self.index] = Some(Arc::clone(&process));
        self.bus.publish(
            self.event(EventKind::WorkerStarting)
                .with_process(process.id())
                .with_attempt(attempt),
        );
        Ok(process)
    }

    /// Runs until the token is cancelled, restarts are exhausted, or a fork fails.
    pub async fn run(self, mut process: Arc<ScriptProcess>, token: CancellationToken) {
        let mut restarts: u32 = 0;

        loop {
            let Some(exit) = self.watch(&process, &token).await else {
                return;
            };
            self.bus.publish(
                self.event(EventKind::WorkerExited)
                    .with_process(process.id())
                    .with_reason(exit.to_string()),
            );
            self.vacate(&process);

            if token.is_cancelled() {
                return;
            }
            if !self.restart.allows(restarts) {
                self.bus
                    .publish(self.event(EventKind::RestartsExhausted).with_attempt(restarts));
                return;
            }

            let delay = self.restart.delay(restarts);
            restarts += 1;
            self.bus.publish(
                self.event(EventKind::RestartScheduled)
                    .with_attempt(restarts)
                    .with_delay(delay),
            );
            if !delay.is_zero() {
                select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => return,
                }
            }
            if token.is_cancelled() {
                return;
            }

            process = match self.fork(restarts) {
                Ok(process) => process,
                Err(e) => {
                    self.bus
                        .publish(self.event(EventKind::WorkerDead).with_reason(e.to_string()));
                    return;
                }
            };
        }
    }

    /// Waits for `process` to exit, enforcing the uptime limit meanwhile.
    ///
    /// Status events are only subscribed to while a limit is being enforced, so an
    /// unlimited slot holds no extra inbound queue. Returns `None` if the token is
    /// cancelled first.
    async fn watch(&self, process: &ScriptProcess, token: &CancellationToken) -> Option<ExitValue> {
        let mut statuses = self
            .uptime_limit
            .map(|_| process.listen_as::<ProcessStatus>(STATUS_EVENT).boxed());

        loop {
            let status = select! {
                _ = token.cancelled() => return None,
                exit = process.exit() => return Some(exit),
                Some(status) = next_status(&mut statuses) => status,
            };
            if self.uptime_limit.is_some_and(|limit| status.uptime > limit) {
                debug!(worker = %self.spec.name, process = process.name(), uptime = status.uptime, "RESTART");
                self.bus.publish(
                    self.event(EventKind::UptimeExceeded)
                        .with_process(process.id())
                        .with_uptime(status.uptime),
                );
                process.kill();
                statuses = None;
            }
        }
    }

    /// Clears the slot if it still holds `process`.
    fn vacate(&self, process: &Arc<ScriptProcess>) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(self.index) {
            if slot.as_ref().is_some_and(|p| Arc::ptr_eq(p, process)) {
                *slot = None;
            }
        }
    }

    pub fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_worker(self.spec.name.as_str())
            .with_slot(self.index)
    }
}

/// Next status report, or never when no subscription is held.
async fn next_status(
    statuses: &mut Option<BoxStream<'static, ProcessStatus>>,
) -> Option<ProcessStatus> {
    match statuses {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn actor(dir: &std::path::Path, uptime_limit: Option<f64>) -> SlotActor {
        let script = dir.join("idle.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let scripts = Scripts::new(&Config::default().with_script_root(dir)).unwrap();
        SlotActor {
            index: 0,
            spec: Arc::new(WorkerSpec::new("idle.sh")),
            uptime_limit,
            restart: RestartPolicy::never(),
            scripts: Arc::new(scripts),
            slots: Arc::new(RwLock::new(vec![None])),
            bus: Bus::new(16),
        }
    }

    async fn inbound_queues(uptime_limit: Option<f64>) -> usize {
        let dir = tempfile::tempdir().unwrap();
        let actor = actor(dir.path(), uptime_limit);
        let process = actor.fork(0).unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(actor.run(Arc::clone(&process), token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let queues = process.subscriber_count();

        token.cancel();
        handle.await.unwrap();
        process.force_kill();
        process.exit().await;
        queues
    }

    #[tokio::test]
    async fn test_unlimited_slot_holds_no_status_subscription() {
        // Only the process's own dispatch queue.
        assert_eq!(inbound_queues(None).await, 1);
    }

    #[tokio::test]
    async fn test_limited_slot_subscribes_to_status() {
        assert_eq!(inbound_queues(Some(3600.0)).await, 2);
    }
}
