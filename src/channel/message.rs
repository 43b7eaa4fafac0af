//! # Wire messages exchanged between a parent and a child process.
//!
//! Every message is a `{kind, data}` pair; one JSON object per line on the wire:
//! ```text
//! {"kind":"CallRequest","data":{"id":1,"target":"Test","method":"echo","args":[5]}}
//! {"kind":"CallResponse","data":{"id":1,"next":5}}
//! {"kind":"CallResponse","data":{"id":1,"complete":true}}
//! {"kind":"Event","data":{"name":"status","data":{"uptime":61.2}}}
//! ```
//!
//! ## Call response shapes
//! A [`CallResponse`] is exactly one of:
//! - `next` value (zero or more per call),
//! - `error` (terminal),
//! - `complete: true` (terminal).
//!
//! Use [`CallResponse::into_reply`] instead of inspecting the optional fields directly:
//! a `next` of JSON `null` is indistinguishable from an absent `next` on the wire, so
//! a response that is neither an error nor complete is always a `Next`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;
use crate::sinks::{LogRecord, MetricRecord};

/// A single unit of cross-process communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Message {
    /// Structured log line forwarded child → parent.
    Log(LogRecord),
    /// Metric sample forwarded child → parent.
    Metric(MetricRecord),
    /// Remote method invocation (either direction).
    CallRequest(CallRequest),
    /// Value, error or completion for a pending call (either direction).
    CallResponse(CallResponse),
    /// Named fire-and-forget event (either direction).
    Event(EventMessage),
    /// Application-defined payload, not interpreted by procvisor.
    User(Value),
}

impl Message {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Message::Log(_) => "log",
            Message::Metric(_) => "metric",
            Message::CallRequest(_) => "call_request",
            Message::CallResponse(_) => "call_response",
            Message::Event(_) => "event",
            Message::User(_) => "user",
        }
    }
}

/// Request to invoke `target.method(args...)` on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Caller-local id; unique per direction for the lifetime of the channel.
    pub id: u64,
    /// Registered target name.
    pub target: String,
    /// Method name on the target.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Response to a [`CallRequest`] with the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// Id of the request being answered.
    pub id: u64,
    /// Produced value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Value>,
    /// Terminal failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    /// Terminal success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
}

/// Interpreted [`CallResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// One produced value.
    Next(Value),
    /// Terminal failure.
    Error(RemoteError),
    /// Terminal success.
    Complete,
}

impl CallResponse {
    /// Builds a `next` response.
    pub fn next(id: u64, value: Value) -> Self {
        Self {
            id,
            next: Some(value),
            error: None,
            complete: None,
        }
    }

    /// Builds a terminal `error` response.
    pub fn error(id: u64, error: RemoteError) -> Self {
        Self {
            id,
            next: None,
            error: Some(error),
            complete: None,
        }
    }

    /// Builds a terminal `complete` response.
    pub fn complete(id: u64) -> Self {
        Self {
            id,
            next: None,
            error: None,
            complete: Some(true),
        }
    }

    /// Classifies the response. `error` wins over `complete`; anything else is a value.
    pub fn into_reply(self) -> Reply {
        if let Some(error) = self.error {
            Reply::Error(error)
        } else if self.complete.unwrap_or(false) {
            Reply::Complete
        } else {
            Reply::Next(self.next.unwrap_or(Value::Null))
        }
    }
}

/// Named event with an optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event name used by listeners to filter.
    pub name: String,
    /// Optional payload (`null` when absent).
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_is_kind_and_data() {
        let msg = Message::CallRequest(CallRequest {
            id: 7,
            target: "Test".into(),
            method: "echo".into(),
            args: vec![json!(5)],
        });
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({"kind": "CallRequest", "data": {"id": 7, "target": "Test", "method": "echo", "args": [5]}})
        );
    }

    #[test]
    fn test_null_next_is_still_a_value() {
        let resp: CallResponse = serde_json::from_value(json!({"id": 1, "next": null})).unwrap();
        assert_eq!(resp.into_reply(), Reply::Next(Value::Null));
    }

    #[test]
    fn test_error_wins_over_complete() {
        let resp = CallResponse {
            id: 1,
            next: None,
            error: Some(RemoteError::new("E", "m")),
            complete: Some(true),
        };
        assert!(matches!(resp.into_reply(), Reply::Error(_)));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let res = serde_json::from_str::<Message>(r#"{"kind":"Bogus","data":{}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_event_without_data_decodes_null() {
        let msg: Message = serde_json::from_str(r#"{"kind":"Event","data":{"name":"ping"}}"#).unwrap();
        match msg {
            Message::Event(ev) => {
                assert_eq!(ev.name, "ping");
                assert_eq!(ev.data, Value::Null);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
