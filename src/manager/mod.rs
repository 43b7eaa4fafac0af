//! Worker supervision.
//!
//! ## Contents
//! - [`WorkerSpec`]    what runs in a slot (script, uptime limit, args, restart override)
//! - [`WorkerManager`] forks one process per spec, restarts on exit, enforces uptime limits
//!
//! ## Quick wiring
//! ```text
//! Config ──► Scripts ──► WorkerManager::new(cfg, scripts, specs)
//!                              ├─ slot 0 ─► SlotActor ─► ScriptProcess
//!                              ├─ slot 1 ─► SlotActor ─► ScriptProcess
//!                              └─ Bus ─► SubscriberSet ─► LogWriter / custom
//! ```

#[allow(clippy::module_inception)]
mod manager;
mod shutdown;
mod slot;
mod spec;

pub use manager::WorkerManager;
pub use shutdown::wait_for_shutdown_signal;
pub use spec::WorkerSpec;
