//! # Servicing remote calls.
//!
//! [`Responder`] answers [`CallRequest`]s arriving on a [`Channel`] by resolving them in a
//! [`Registry`] and streaming the handler's output back as [`CallResponse`]s.
//!
//! ## Flow
//! ```text
//! CallRequest{id, target, method, args}
//!   ├─► registry.resolve(target, method)
//!   │      └─ Err ─► CallResponse{id, error}                     (TargetNotFound / MethodNotFound)
//!   └─► handler(args) ─► stream
//!          ├─ Ok(value) ─► CallResponse{id, next: value}       (0..N times)
//!          ├─ Err(e)    ─► CallResponse{id, error: e}          (terminal)
//!          ├─ panic     ─► CallResponse{id, error: "Panic"}    (terminal)
//!          └─ end       ─► CallResponse{id, complete: true}    (terminal)
//! ```
//!
//! ## Rules
//! - Every request gets exactly one terminal response while the channel is open.
//! - Handler streams run on their own tokio task; a slow handler does not delay other calls.
//! - If the channel closes mid-stream, the handler stream is dropped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::call::registry::{Registry, ValueStream};
use crate::channel::{CallRequest, CallResponse, Channel, Message};
use crate::error::RemoteError;

/// Answers call requests against a registry.
#[derive(Clone)]
pub struct Responder {
    channel: Channel,
    registry: Arc<Registry>,
}

impl Responder {
    /// Creates a responder replying on `channel`.
    pub fn new(channel: Channel, registry: Arc<Registry>) -> Self {
        Self { channel, registry }
    }

    /// Handles one request; the handler stream is driven on a spawned task.
    ///
    /// Resolution failures are answered before this returns.
    pub fn handle(&self, request: CallRequest) -> Option<JoinHandle<()>> {
        let CallRequest {
            id,
            target,
            method,
            args,
        } = request;
        debug!(channel = self.channel.label(), id, "SERVE {target}.{method}");

        let stream = match self.open(&target, &method, args) {
            Ok(stream) => stream,
            Err(err) => {
                self.reply(CallResponse::error(id, err));
                return None;
            }
        };

        let me = self.clone();
        Some(tokio::spawn(async move { me.drive(id, stream).await }))
    }

    /// Resolves the handler and invokes it, isolating panics raised while building the stream.
    fn open(
        &self,
        target: &str,
        method: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<ValueStream, RemoteError> {
        let handler = self.registry.resolve(target, method)?;
        std::panic::catch_unwind(AssertUnwindSafe(|| handler(args)))
            .map_err(|panic| panic_error(&*panic))
    }

    async fn drive(&self, id: u64, mut stream: ValueStream) {
        loop {
            let next = tokio::select! {
                _ = self.channel.closed() => return,
                next = AssertUnwindSafe(stream.next()).catch_unwind() => next,
            };
            match next {
                Ok(Some(Ok(value))) => self.reply(CallResponse::next(id, value)),
                Ok(Some(Err(err))) => {
                    self.reply(CallResponse::error(id, err));
                    return;
                }
                Ok(None) => {
                    self.reply(CallResponse::complete(id));
                    return;
                }
                Err(panic) => {
                    self.reply(CallResponse::error(id, panic_error(&*panic)));
                    return;
                }
            }
        }
    }

    fn reply(&self, response: CallResponse) {
        self.channel.send(Message::CallResponse(response));
    }
}

fn panic_error(panic: &(dyn std::any::Any + Send)) -> RemoteError {
    let message = if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    };
    RemoteError::new("Panic", message)
}
