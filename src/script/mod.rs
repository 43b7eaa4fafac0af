//! Process supervision: spawning workers and talking to them.
//!
//! ## Contents
//! - [`Scripts`]       resolves targets under a root directory and forks them
//! - [`ScriptProcess`] parent-side handle: calls, events, exit, kill
//! - [`ExitValue`]     exit code or terminating signal name

mod exit;
mod process;
mod scripts;

pub use exit::ExitValue;
pub use process::ScriptProcess;
pub use scripts::Scripts;
