//! Message channel: wire types and the duplex transport.
//!
//! ## Contents
//! - [`Message`] and its payloads ([`CallRequest`], [`CallResponse`], [`EventMessage`])
//! - [`Channel`] newline-delimited JSON transport with fan-out subscriptions
//!
//! The call protocol ([`crate::call`]) and the remote event bus ([`crate::events::EventBus`])
//! are both layered on a [`Channel`]; neither owns it.

#[allow(clippy::module_inception)]
mod channel;
mod message;

pub use channel::{Channel, Messages};
pub use message::{CallRequest, CallResponse, EventMessage, Message, Reply};
