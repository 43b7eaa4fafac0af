//! # Broadcast bus for lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. The worker manager and its
//! slot loops publish; the manager's listener fans events out to the
//! [`SubscriberSet`](crate::SubscriberSet), and callers may subscribe directly.
//!
//! ```text
//!   slot loop 0 ──┐
//!   slot loop 1 ──┼──► Bus ──► manager listener ──► SubscriberSet ──► Subscribe::on_event
//!   manager     ──┘       └──► Bus::subscribe() (tests, custom consumers)
//! ```
//!
//! ## Rules
//! - `publish()` never blocks; events are dropped when nobody is subscribed.
//! - Slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for lifecycle events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver observing events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
