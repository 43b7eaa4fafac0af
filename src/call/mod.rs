//! Call protocol: streaming request/response correlation over a [`Channel`](crate::Channel).
//!
//! ## Contents
//! - [`Caller`]    issues calls and yields a [`CallStream`] per call
//! - [`Responder`] answers incoming calls from a [`Registry`]
//! - [`Registry`] / [`Target`] name-addressed capability registry
//!
//! The protocol is symmetric: a parent and its child each own a `Caller` (independent id
//! counters) and a `Responder` over the same channel.

mod caller;
mod registry;
mod responder;

pub use caller::{CallStream, Caller, DEFAULT_CALL_TIMEOUT};
pub use registry::{Handler, Registry, RegistryBuilder, Target, ValueStream};
pub use responder::Responder;
