//! # Named events exchanged with the peer over a [`Channel`].
//!
//! [`EventBus`] is fire-and-forget pub/sub layered on the channel, independent of call
//! correlation:
//!
//! ```text
//!   send(name, data) ──► Message::Event{name, data} ──► peer
//!
//!   peer ──► Message::Event ──► listen(name) ──► filter(name) ──► Stream<Value>
//!                           └─► listen(other) ...
//! ```
//!
//! ## Rules
//! - Delivery is at-most-once; sending on a disconnected channel is a no-op.
//! - Every listener is an independent subscription and receives every matching event
//!   received after it subscribed.
//! - Listener streams complete when the channel closes.

use futures::{Stream, StreamExt, future};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::{Channel, EventMessage, Message};

/// Named event pub/sub over a channel. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    channel: Channel,
}

impl EventBus {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Emits `name` with `data` to the peer.
    pub fn send(&self, name: &str, data: Value) {
        debug!(channel = self.channel.label(), "EVENT {name}");
        self.channel.send(Message::Event(EventMessage {
            name: name.to_string(),
            data,
        }));
    }

    /// Serializes `data` and emits it as `name`.
    ///
    /// Payloads that fail to serialize are logged and not sent.
    pub fn send_as<T: Serialize>(&self, name: &str, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) => self.send(name, value),
            Err(e) => warn!(channel = self.channel.label(), event = name, error = %e, "event payload not serializable"),
        }
    }

    /// Payloads of inbound events named `name`.
    pub fn listen(&self, name: &str) -> impl Stream<Item = Value> + Send + 'static {
        let name = name.to_string();
        self.channel.messages().filter_map(move |message| {
            let matched = match message {
                Message::Event(event) if event.name == name => Some(event.data),
                _ => None,
            };
            future::ready(matched)
        })
    }

    /// Like [`listen`](Self::listen), decoding each payload as `T`.
    ///
    /// Payloads that do not decode are logged and skipped.
    pub fn listen_as<T>(&self, name: &str) -> impl Stream<Item = T> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let label = self.channel.label().to_string();
        let event = name.to_string();
        self.listen(name).filter_map(move |data| {
            let decoded = match serde_json::from_value::<T>(data) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(channel = %label, event = %event, error = %e, "skipping undecodable event payload");
                    None
                }
            };
            future::ready(decoded)
        })
    }
}
