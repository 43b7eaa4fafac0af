//! # Issuing remote calls.
//!
//! [`Caller`] turns `call(target, method, args)` into a [`CallRequest`] on a [`Channel`] and
//! returns a [`CallStream`] of the values the remote method produces.
//!
//! ## Flow
//! ```text
//! call()
//!   ├─► id = next_id()                 (1, 2, 3, ... per Caller, never reused)
//!   ├─► sub = channel.messages()       (subscribe *before* sending)
//!   ├─► channel.send(CallRequest{id})
//!   └─► CallStream:
//!         loop until deadline (issued_at + timeout):
//!           CallResponse{id, next}      → yield Ok(value)
//!           CallResponse{id, error}     → yield Err(Remote), end
//!           CallResponse{id, complete}  → end
//!           other messages / other ids  → skip
//!           subscription ended          → yield Err(Closed), end
//!         deadline elapsed              → yield Err(Timeout), end
//! ```
//!
//! ## Rules
//! - Every call ends with exactly one terminal outcome: completion, a remote error,
//!   `Closed`, or `Timeout`.
//! - Dropping the stream (or timing out) only detaches the local listener; nothing is sent
//!   to the remote side, and any late responses for the id are ignored.
//! - Concurrent calls on the same channel are independent subscriptions.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::{CallRequest, Channel, Message, Reply};
use crate::error::CallError;

/// Default timeout for a call to reach its terminal response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Values produced by one remote call.
pub type CallStream = Pin<Box<dyn Stream<Item = Result<Value, CallError>> + Send>>;

/// Issues calls over a channel and correlates their responses.
///
/// Cheap to clone; clones share the id counter.
#[derive(Clone)]
pub struct Caller {
    channel: Channel,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl Caller {
    /// Creates a caller using `timeout` for calls that do not specify one.
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        Self {
            channel,
            next_id: Arc::new(AtomicU64::new(0)),
            timeout,
        }
    }

    /// Default timeout applied by [`call`](Self::call).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocates the next call id (starts at 1).
    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Calls `target.method(args)` with the default timeout.
    pub fn call(&self, target: &str, method: &str, args: Vec<Value>) -> CallStream {
        self.call_with_timeout(target, method, args, self.timeout)
    }

    /// Calls `target.method(args)`; the request is sent before this returns.
    pub fn call_with_timeout(
        &self,
        target: &str,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> CallStream {
        let id = self.allocate_id();
        let mut responses = self.channel.messages();
        let deadline = Instant::now() + timeout;

        debug!(channel = self.channel.label(), id, "CALL {target}.{method}");
        self.channel.send(Message::CallRequest(CallRequest {
            id,
            target: target.to_string(),
            method: method.to_string(),
            args,
        }));

        let target = target.to_string();
        let method = method.to_string();
        Box::pin(async_stream::stream! {
            loop {
                let message = match tokio::time::timeout_at(deadline, responses.next()).await {
                    Ok(Some(message)) => message,
                    Ok(None) => {
                        yield Err(CallError::Closed { id });
                        break;
                    }
                    Err(_elapsed) => {
                        yield Err(CallError::Timeout { target, method, id, timeout });
                        break;
                    }
                };

                let response = match message {
                    Message::CallResponse(response) if response.id == id => response,
                    _ => continue,
                };
                match response.into_reply() {
                    Reply::Next(value) => yield Ok(value),
                    Reply::Error(err) => {
                        yield Err(CallError::Remote(err));
                        break;
                    }
                    Reply::Complete => break,
                }
            }
        })
    }

    /// Calls `target.method(args)`, waits for completion, and returns the **last** value
    /// decoded as `T`.
    ///
    /// Returns [`CallError::Empty`] if the call completed without producing a value.
    pub async fn call_value<T: DeserializeOwned>(
        &self,
        target: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, CallError> {
        let mut stream = self.call(target, method, args);
        let mut last = None;
        while let Some(item) = stream.next().await {
            last = Some(item?);
        }
        let value = last.ok_or_else(|| CallError::Empty {
            target: target.to_string(),
            method: method.to_string(),
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Calls `target.method(args)` and collects every produced value.
    pub async fn call_all(
        &self,
        target: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, CallError> {
        let mut stream = self.call(target, method, args);
        let mut values = Vec::new();
        while let Some(item) = stream.next().await {
            values.push(item?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CallResponse;
    use crate::error::RemoteError;
    use serde_json::json;

    /// Answers every request on `channel` with the given responses (ids rewritten).
    fn scripted(channel: Channel, replies: Vec<CallResponse>) {
        let mut inbound = channel.messages();
        tokio::spawn(async move {
            while let Some(message) = inbound.next().await {
                if let Message::CallRequest(req) = message {
                    for mut reply in replies.clone() {
                        reply.id = req.id;
                        channel.send(Message::CallResponse(reply));
                    }
                }
            }
        });
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        let (local, _remote) = Channel::pair();
        let caller = Caller::new(local, DEFAULT_CALL_TIMEOUT);
        let ids: Vec<u64> = (0..5).map(|_| caller.allocate_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(caller.clone().allocate_id(), 6);
    }

    #[tokio::test]
    async fn test_stream_of_values_then_complete() {
        let (local, remote) = Channel::pair();
        scripted(
            remote,
            vec![
                CallResponse::next(0, json!(1)),
                CallResponse::next(0, json!(2)),
                CallResponse::complete(0),
            ],
        );
        let caller = Caller::new(local, DEFAULT_CALL_TIMEOUT);
        let values = caller.call_all("T", "m", vec![]).await.unwrap();
        assert_eq!(values, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_remote_error_is_reconstructed() {
        let (local, remote) = Channel::pair();
        scripted(
            remote,
            vec![CallResponse::error(0, RemoteError::new("TypeError", "bad").with_stack("at x"))],
        );
        let caller = Caller::new(local, DEFAULT_CALL_TIMEOUT);
        let err = caller.call_value::<Value>("T", "m", vec![]).await.unwrap_err();
        let remote = err.as_remote().expect("remote error");
        assert_eq!(remote.name, "TypeError");
        assert_eq!(remote.message, "bad");
        assert_eq!(remote.stack, "at x");
    }

    #[tokio::test]
    async fn test_complete_without_value_is_empty() {
        let (local, remote) = Channel::pair();
        scripted(remote, vec![CallResponse::complete(0)]);
        let caller = Caller::new(local, DEFAULT_CALL_TIMEOUT);
        let err = caller.call_value::<i64>("T", "m", vec![]).await.unwrap_err();
        assert_eq!(err.as_label(), "call_empty");
    }

    #[tokio::test]
    async fn test_timeout_when_nothing_answers() {
        let (local, _remote) = Channel::pair();
        let caller = Caller::new(local, DEFAULT_CALL_TIMEOUT);
        let started = std::time::Instant::now();
        let mut stream = caller.call_with_timeout("T", "m", vec![], Duration::from_millis(100));
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_channel_fails_pending_call() {
        let (local, remote) = Channel::pair();
        let caller = Caller::new(local, DEFAULT_CALL_TIMEOUT);
        let mut stream = caller.call("T", "m", vec![]);
        remote.disconnect();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, CallError::Closed { id: 1 }));
    }
}
