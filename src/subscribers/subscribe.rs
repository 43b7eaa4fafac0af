//! # Lifecycle event subscriber trait.
//!
//! [`Subscribe`] is the extension point for reacting to worker lifecycle [`Event`]s
//! (alerting, metrics, audit trails).
//!
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_event()
//!                                    └─► panic caught → EventKind::SubscriberPanicked
//! ```
//!
//! ## Rules
//! - Each subscriber has its own queue and task; a slow subscriber only delays itself.
//! - A full queue drops the event for that subscriber and publishes
//!   `EventKind::SubscriberOverflow`.
//! - Events are processed in FIFO order per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use procvisor::{Event, EventKind, Subscribe};
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! #[derive(Default)]
//! struct CrashCounter(AtomicU32);
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerExited && ev.reason.as_deref() != Some("0") {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of lifecycle events.
///
/// Implementations should use async I/O, handle their own errors and avoid panicking;
/// panics are caught and reported but the event is lost.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes one event on the subscriber's own task.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
