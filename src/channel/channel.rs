//! # Duplex message channel over a pair of byte streams.
//!
//! [`Channel`] frames [`Message`]s as newline-delimited JSON. It owns two background tasks:
//!
//! ```text
//!   send(msg) ──► [unbounded queue] ──► writer task ──► AsyncWrite (peer stdin)
//!
//!   AsyncRead (peer stdout) ──► reader task ──► decode ──┬──► subscriber 1 (messages())
//!                                                       ├──► subscriber 2
//!                                                       └──► subscriber N
//! ```
//!
//! ## Rules
//! - `send` is synchronous and best-effort; it is a silent no-op once disconnected.
//! - Each [`Channel::messages`] call creates an **independent** subscription that sees every
//!   message decoded after it subscribed, in wire order.
//! - Subscriptions are unbounded: the channel never applies backpressure and never drops a
//!   message for a live subscriber.
//! - Malformed lines are logged and discarded; they never close the channel.
//! - When the read side ends (EOF, I/O error, or [`Channel::close`]) every subscription
//!   completes and later subscriptions complete immediately.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::message::Message;

/// Inbound message subscription returned by [`Channel::messages`].
pub type Messages = UnboundedReceiverStream<Message>;

/// Buffer size of each direction of an in-memory [`Channel::pair`].
const PAIR_BUFFER: usize = 64 * 1024;

/// Cloneable handle to a duplex message channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

struct Inner {
    label: Arc<str>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// `None` once the read side has ended.
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<Message>>>>,
    closed: CancellationToken,
}

impl Channel {
    /// Connects a channel to a reader/writer pair and spawns its I/O tasks.
    ///
    /// `label` identifies the channel in logs. Must be called inside a tokio runtime.
    pub fn connect<R, W>(label: impl Into<Arc<str>>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::open(label, reader, writer).0
    }

    /// Like [`connect`](Self::connect), also returning a subscription that is registered
    /// before the first line is read, so it observes every inbound message.
    pub fn open<R, W>(label: impl Into<Arc<str>>, reader: R, writer: W) -> (Self, Messages)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (first_tx, first_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            label: label.into(),
            outbound: Mutex::new(Some(tx)),
            subscribers: Mutex::new(Some(vec![first_tx])),
            closed: CancellationToken::new(),
        });

        tokio::spawn(write_loop(Arc::clone(&inner), rx, writer));
        tokio::spawn(read_loop(Arc::clone(&inner), reader));
        (Self { inner }, UnboundedReceiverStream::new(first_rx))
    }

    /// Connects to this process's stdin/stdout (the child side of a spawned worker).
    pub fn stdio(label: impl Into<Arc<str>>) -> (Self, Messages) {
        Self::open(label, tokio::io::stdin(), tokio::io::stdout())
    }

    /// Creates two in-memory channels wired to each other.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(PAIR_BUFFER);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            Self::connect("pair.a", a_read, a_write),
            Self::connect("pair.b", b_read, b_write),
        )
    }

    /// Returns the label used in logs.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Queues a message for the peer; silently dropped if the channel is disconnected.
    pub fn send(&self, message: Message) {
        if let Some(tx) = self.inner.outbound.lock().as_ref() {
            let _ = tx.send(message);
        }
    }

    /// Subscribes to inbound messages.
    ///
    /// The stream completes when the channel closes; it completes immediately if the
    /// channel is already closed.
    pub fn messages(&self) -> Messages {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(list) = self.inner.subscribers.lock().as_mut() {
            list.push(tx);
        }
        UnboundedReceiverStream::new(rx)
    }

    /// Number of live inbound subscriptions.
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .as_ref()
            .map_or(0, |list| list.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// `true` while outbound messages can still be delivered.
    pub fn is_connected(&self) -> bool {
        !self.inner.closed.is_cancelled() && self.inner.outbound.lock().is_some()
    }

    /// `true` once the read side has ended.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Stops sending: flushes queued messages, then shuts the write side so the peer
    /// observes end-of-input. Inbound messages keep flowing.
    pub fn disconnect(&self) {
        self.inner.outbound.lock().take();
    }

    /// Disconnects both directions and completes every subscription.
    pub fn close(&self) {
        self.disconnect();
        self.inner.closed.cancel();
        self.inner.end_subscriptions();
    }

    /// Resolves once the read side has ended.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }
}

impl Inner {
    fn deliver(&self, message: Message) {
        if let Some(list) = self.subscribers.lock().as_mut() {
            list.retain(|tx| tx.send(message.clone()).is_ok());
        }
    }

    fn end_subscriptions(&self) {
        self.subscribers.lock().take();
    }
}

async fn write_loop<W>(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<Message>, mut writer: W)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(message) = rx.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!(channel = %inner.label, kind = message.as_label(), error = %e, "failed to encode message");
                continue;
            }
        };
        line.push(b'\n');

        let written = async {
            writer.write_all(&line).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            debug!(channel = %inner.label, error = %e, "write side failed, disconnecting");
            inner.outbound.lock().take();
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R>(inner: Arc<Inner>, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            _ = inner.closed.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Message>(&line) {
                        Ok(message) => inner.deliver(message),
                        Err(e) => {
                            warn!(channel = %inner.label, error = %e, "discarding malformed message");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(channel = %inner.label, error = %e, "read side failed");
                    break;
                }
            }
        }
    }
    inner.closed.cancel();
    inner.end_subscriptions();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::message::EventMessage;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn event(name: &str) -> Message {
        Message::Event(EventMessage {
            name: name.into(),
            data: json!(null),
        })
    }

    #[tokio::test]
    async fn test_every_subscription_sees_every_message_in_order() {
        let (a, b) = Channel::pair();
        let mut first = b.messages();
        let mut second = b.messages();

        a.send(event("one"));
        a.send(event("two"));

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.next().await, Some(event("one")));
            assert_eq!(sub.next().await, Some(event("two")));
        }
    }

    #[tokio::test]
    async fn test_malformed_line_is_discarded() {
        let (raw, remote) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(remote);
        let channel = Channel::connect("test", read, write);
        let mut messages = channel.messages();

        let (_raw_read, mut raw_write) = tokio::io::split(raw);
        raw_write.write_all(b"not json\n").await.unwrap();
        raw_write
            .write_all(b"{\"kind\":\"Event\",\"data\":{\"name\":\"ok\"}}\n")
            .await
            .unwrap();

        assert_eq!(messages.next().await, Some(event("ok")));
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn test_disconnect_ends_peer_subscriptions() {
        let (a, b) = Channel::pair();
        let mut messages = b.messages();

        a.send(event("last"));
        a.disconnect();

        assert_eq!(messages.next().await, Some(event("last")));
        assert_eq!(messages.next().await, None);
        tokio::time::timeout(Duration::from_secs(1), b.closed())
            .await
            .expect("peer should observe close");
    }

    #[tokio::test]
    async fn test_send_after_close_is_noop() {
        let (a, b) = Channel::pair();
        a.close();
        assert!(!a.is_connected());
        a.send(event("dropped"));

        let mut messages = a.messages();
        assert_eq!(messages.next().await, None);
        drop(b);
    }
}
