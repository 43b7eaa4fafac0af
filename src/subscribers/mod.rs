//! # Lifecycle event subscribers.
//!
//! Lifecycle [`Event`](crate::Event)s published on the [`Bus`](crate::Bus) by the worker
//! manager are fanned out to [`Subscribe`] implementations through a [`SubscriberSet`].
//!
//! ```text
//! slot loops ── publish ──► Bus ──► manager listener ──► SubscriberSet
//!                                                         ├──► LogWriter (tracing)
//!                                                         └──► custom subscribers
//! ```

mod log;
mod subscribe;
mod subscriber_set;

pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
