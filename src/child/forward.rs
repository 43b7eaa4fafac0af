//! # Forwarding a worker's `tracing` output to its parent.
//!
//! [`ForwardLayer`] is a `tracing-subscriber` layer that turns every event into a
//! [`LogRecord`] and sends it upward as a `Log` message. The parent re-emits it through its
//! [`Sink`](crate::Sink) tagged with the worker's name.
//!
//! stdout carries the channel, so a worker must never install a stdout writer; pair this
//! layer with a stderr `fmt` layer if local output is wanted:
//!
//! ```no_run
//! # async fn demo(child: procvisor::ChildProcess) {
//! use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
//!
//! tracing_subscriber::registry()
//!     .with(EnvFilter::new("info"))
//!     .with(child.forward_layer())
//!     .with(fmt::layer().with_writer(std::io::stderr))
//!     .init();
//! # }
//! ```

use std::fmt;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::channel::{Channel, Message};
use crate::sinks::LogRecord;

/// Sends tracing events to the parent as log records.
pub struct ForwardLayer {
    channel: Channel,
}

impl ForwardLayer {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

impl<S: tracing::Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut fields = Fields::default();
        event.record(&mut fields);
        fields
            .metadata
            .insert("target".to_string(), Value::String(meta.target().to_string()));

        let mut record = LogRecord::new((*meta.level()).into(), fields.message);
        record.metadata = Value::Object(fields.metadata);
        self.channel.send(Message::Log(record));
    }
}

#[derive(Default)]
struct Fields {
    message: String,
    metadata: Map<String, Value>,
}

impl Fields {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.metadata.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::LogLevel;
    use futures::StreamExt;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn test_event_becomes_log_message() {
        let (child, parent) = Channel::pair();
        let mut inbound = parent.messages();
        let subscriber = tracing_subscriber::registry().with(ForwardLayer::new(child));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(job = "sync", attempt = 2u64, "retrying");
        });

        match inbound.next().await {
            Some(Message::Log(record)) => {
                assert_eq!(record.level, LogLevel::Warning);
                assert_eq!(record.message, "retrying");
                assert_eq!(record.metadata["job"], "sync");
                assert_eq!(record.metadata["attempt"], 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
