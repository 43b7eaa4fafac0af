//! # Lifecycle events emitted by the worker manager and process supervisor.
//!
//! [`EventKind`] classifies what happened to a worker slot; [`Event`] carries the metadata
//! (worker name, slot index, process id, exit value, delays).
//!
//! These are **local** observability events delivered through the in-process
//! [`Bus`](super::Bus). They are unrelated to the named events exchanged with a child over
//! its channel ([`EventBus`](super::EventBus)).
//!
//! ## Ordering
//! `seq` is process-wide and strictly increasing, so events from different slots can be
//! merged back into publication order.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerExited)
//!     .with_worker("worker.js")
//!     .with_slot(0)
//!     .with_reason("SIGTERM");
//!
//! assert_eq!(ev.kind, EventKind::WorkerExited);
//! assert_eq!(ev.worker.as_deref(), Some("worker.js"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Next `seq` handed out by [`Event::new`].
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// A subscriber's `on_event` panicked; the subscriber keeps running.
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// An event could not be queued for a subscriber.
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: `"full"` or `"closed"`
    SubscriberOverflow,

    // === Worker lifecycle ===
    /// A process was forked into a slot.
    ///
    /// Sets:
    /// - `worker`, `slot`
    /// - `process`: spawn counter of the new process
    /// - `attempt`: restarts so far in this slot (0 for the first fork)
    WorkerStarting,

    /// A worker process exited.
    ///
    /// Sets:
    /// - `worker`, `slot`, `process`
    /// - `reason`: exit value (`"0"`, `"SIGTERM"`, ...)
    WorkerExited,

    /// A worker reported an uptime above its limit and is being terminated.
    ///
    /// Sets:
    /// - `worker`, `slot`, `process`
    /// - `uptime_ms`: reported uptime
    UptimeExceeded,

    /// A replacement fork is scheduled after a backoff delay.
    ///
    /// Sets:
    /// - `worker`, `slot`
    /// - `attempt`: restart number about to happen (1-based)
    /// - `delay_ms`: delay before the fork
    RestartScheduled,

    /// The slot's restart policy forbids another fork; the slot stays empty.
    ///
    /// Sets:
    /// - `worker`, `slot`
    /// - `attempt`: restarts performed
    RestartsExhausted,

    /// A replacement fork failed; the slot stays empty.
    ///
    /// Sets:
    /// - `worker`, `slot`
    /// - `reason`: spawn error
    WorkerDead,

    // === Manager lifecycle ===
    /// `stop()` was requested; restarts are disabled from here on.
    StopRequested,

    /// Every connected worker exited after a stop.
    AllStopped,

    /// Stop grace exceeded; remaining workers are force-killed.
    ///
    /// Sets:
    /// - `reason`: comma-separated worker names
    GraceExceeded,
}

/// One lifecycle event. Which optional fields are filled depends on [`EventKind`].
#[derive(Debug, Clone)]
pub struct Event {
    /// Publication order across the whole process.
    pub seq: u64,
    /// When the event was created.
    pub at: SystemTime,
    pub kind: EventKind,

    /// Worker (target script) name, or subscriber name for subscriber events.
    pub worker: Option<Arc<str>>,
    /// Slot index in the manager.
    pub slot: Option<usize>,
    /// Spawn counter of the process (`<namespace>.<worker>.<process>`).
    pub process: Option<u64>,
    /// Restart count.
    pub attempt: Option<u32>,
    /// Restart delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Reported uptime in milliseconds.
    pub uptime_ms: Option<u64>,
    /// Human-readable reason (exit value, error text, ...).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Stamps a new event with the current time and the next `seq`.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            slot: None,
            process: None,
            attempt: None,
            delay_ms: None,
            uptime_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    #[inline]
    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }

    #[inline]
    pub fn with_process(mut self, process: u64) -> Self {
        self.process = Some(process);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a restart delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a reported uptime (stored as milliseconds).
    #[inline]
    pub fn with_uptime(mut self, secs: f64) -> Self {
        self.uptime_ms = Some((secs.max(0.0) * 1000.0) as u64);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// `subscriber` could not accept an event (`reason`: `"full"` or `"closed"`).
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_worker(subscriber)
            .with_reason(reason)
    }

    /// `subscriber` panicked while handling an event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_worker(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::StopRequested);
        let b = Event::new(EventKind::AllStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_is_clamped_to_u32() {
        let ev = Event::new(EventKind::RestartScheduled).with_delay(Duration::from_secs(u64::MAX / 1000));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
