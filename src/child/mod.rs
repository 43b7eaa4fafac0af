//! Worker side of the protocol.
//!
//! ## Contents
//! - [`ChildProcess`]  connection to the parent: serves calls, sends events/metrics/status
//! - [`ForwardLayer`]  `tracing` layer shipping log events to the parent
//! - [`ProcessStatus`] payload of the periodic [`STATUS_EVENT`]

mod forward;
mod process;
mod status;

pub use forward::ForwardLayer;
pub use process::ChildProcess;
pub use status::{ProcessStatus, STATUS_EVENT};
