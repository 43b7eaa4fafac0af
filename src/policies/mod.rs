//! Restart policies for worker slots.
//!
//! ## Contents
//! - [`RestartPolicy`] whether an exited worker is replaced (unlimited / never / limited)
//! - [`BackoffPolicy`] how long to wait before each replacement (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization of those waits
//!
//! ## Quick wiring
//! ```text
//! Config { restart: RestartPolicy }      (manager-wide default)
//! WorkerSpec { restart: Option<_> }      (per-slot override)
//!      └─► slot loop uses:
//!           - restart.allows(n) to decide replace/stop
//!           - restart.delay(n) to wait before forking
//! ```

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
