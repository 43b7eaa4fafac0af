//! # Lifecycle events written through `tracing`.
//!
//! [`LogWriter`] turns each lifecycle [`Event`] into one structured `tracing` line under the
//! `procvisor::lifecycle` target. Exits and restarts are `info`, failures `warn`/`error`.
//!
//! ```text
//! INFO  procvisor::lifecycle: worker starting worker="worker.js" slot=0 process=1 attempt=0
//! INFO  procvisor::lifecycle: worker exited worker="worker.js" slot=0 process=1 exit="SIGTERM"
//! WARN  procvisor::lifecycle: uptime limit exceeded worker="worker.js" slot=0 uptime_ms=3012
//! ERROR procvisor::lifecycle: worker dead worker="worker.js" slot=0 reason="script not found: ..."
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Writes lifecycle events as `tracing` events.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::WorkerStarting => {
                info!(target: "procvisor::lifecycle", worker, slot = ?e.slot, process = ?e.process, attempt = ?e.attempt, "worker starting")
            }
            EventKind::WorkerExited => {
                info!(target: "procvisor::lifecycle", worker, slot = ?e.slot, process = ?e.process, exit = reason, "worker exited")
            }
            EventKind::UptimeExceeded => {
                warn!(target: "procvisor::lifecycle", worker, slot = ?e.slot, process = ?e.process, uptime_ms = ?e.uptime_ms, "uptime limit exceeded")
            }
            EventKind::RestartScheduled => {
                info!(target: "procvisor::lifecycle", worker, slot = ?e.slot, attempt = ?e.attempt, delay_ms = ?e.delay_ms, "restart scheduled")
            }
            EventKind::RestartsExhausted => {
                warn!(target: "procvisor::lifecycle", worker, slot = ?e.slot, restarts = ?e.attempt, "restarts exhausted")
            }
            EventKind::WorkerDead => {
                error!(target: "procvisor::lifecycle", worker, slot = ?e.slot, reason, "worker dead")
            }
            EventKind::StopRequested => info!(target: "procvisor::lifecycle", "stop requested"),
            EventKind::AllStopped => info!(target: "procvisor::lifecycle", "all workers stopped"),
            EventKind::GraceExceeded => {
                warn!(target: "procvisor::lifecycle", stuck = reason, "stop grace exceeded")
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "procvisor::lifecycle", subscriber = worker, reason, "subscriber dropped event")
            }
            EventKind::SubscriberPanicked => {
                error!(target: "procvisor::lifecycle", subscriber = worker, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
