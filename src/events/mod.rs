//! Events: local lifecycle events and named events exchanged with a peer.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] worker lifecycle classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast` for lifecycle events
//! - [`EventBus`] named fire-and-forget events over a [`Channel`](crate::Channel)
//!
//! ## Quick reference
//! - **Lifecycle publishers**: `WorkerManager` and its slot loops, `SubscriberSet` workers
//!   (overflow/panic).
//! - **Lifecycle consumers**: the manager's listener (fans out to `SubscriberSet`) and any
//!   receiver from [`Bus::subscribe`].
//! - **Named events**: `ScriptProcess::event` / `ScriptProcess::listen` on the parent side,
//!   `ChildProcess::event` / `ChildProcess::listen` on the child side.

mod bus;
mod event;
mod remote;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use remote::EventBus;
