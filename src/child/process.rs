//! # Worker-side mirror of [`ScriptProcess`](crate::ScriptProcess).
//!
//! A worker binary builds a [`ChildProcess`] over its stdin/stdout and then parks in
//! [`ChildProcess::run`]:
//!
//! ```text
//!   parent ──► stdin ──► Channel ──► dispatcher ──► CallRequest ──► Responder (worker registry)
//!                                 └► EventBus::listen(..)
//!
//!   ChildProcess ──► stdout ──► parent
//!       ├─ call(..)           CallRequest      (answered by the parent's registry)
//!       ├─ event(..)          Event
//!       ├─ metric/increment   Metric           (parent Sink)
//!       ├─ ForwardLayer       Log              (parent Sink)
//!       └─ every interval     Event "status" {name, pid, uptime}
//! ```
//!
//! `run()` returns once the parent disconnects (end of stdin).

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::call::{CallStream, Caller, Registry, Responder};
use crate::channel::{Channel, Message, Messages};
use crate::child::forward::ForwardLayer;
use crate::child::status::{ProcessStatus, STATUS_EVENT};
use crate::config::ChildConfig;
use crate::error::{CallError, RuntimeError};
use crate::events::EventBus;
use crate::sinks::{LogRecord, MetricKind, MetricRecord};

/// The worker's connection to its parent.
#[derive(Clone)]
pub struct ChildProcess {
    name: Arc<str>,
    started: Instant,
    channel: Channel,
    caller: Caller,
    events: EventBus,
}

impl ChildProcess {
    /// Connects to the parent over stdin/stdout using settings from the environment.
    pub fn from_env(registry: Arc<Registry>) -> Result<Self, RuntimeError> {
        let config = ChildConfig::from_env()?;
        let (channel, inbound) = Channel::stdio(config.name.clone());
        Ok(Self::new(config, channel, inbound, registry))
    }

    /// Builds a worker endpoint over an already connected channel.
    ///
    /// `inbound` must be a subscription of `channel` (see [`Channel::open`]).
    pub fn new(
        config: ChildConfig,
        channel: Channel,
        inbound: Messages,
        registry: Arc<Registry>,
    ) -> Self {
        let child = Self {
            name: config.name.into(),
            started: Instant::now(),
            caller: Caller::new(channel.clone(), config.call_timeout),
            events: EventBus::new(channel.clone()),
            channel,
        };

        tokio::spawn(dispatch(
            inbound,
            Responder::new(child.channel.clone(), registry),
        ));
        tokio::spawn(child.clone().report_status(config.status_interval));
        child
    }

    /// `SCRIPT_NAME` this worker was started with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time since this endpoint was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot sent in the periodic `status` event.
    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            name: self.name.to_string(),
            pid: std::process::id(),
            uptime: self.uptime().as_secs_f64(),
        }
    }

    /// Layer forwarding this process's `tracing` events to the parent.
    pub fn forward_layer(&self) -> ForwardLayer {
        ForwardLayer::new(self.channel.clone())
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Calls `target.method(args)` in the parent.
    pub fn call(&self, target: &str, method: &str, args: Vec<Value>) -> CallStream {
        self.caller.call(target, method, args)
    }

    pub async fn call_value<T: DeserializeOwned>(
        &self,
        target: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, CallError> {
        self.caller.call_value(target, method, args).await
    }

    /// Sends a named event to the parent.
    pub fn event(&self, name: &str, data: Value) {
        self.events.send(name, data);
    }

    /// Named events sent by the parent.
    pub fn listen(&self, name: &str) -> impl Stream<Item = Value> + Send + 'static {
        self.events.listen(name)
    }

    pub fn listen_as<T>(&self, name: &str) -> impl Stream<Item = T> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.events.listen_as(name)
    }

    /// Sends a log record to the parent without going through `tracing`.
    pub fn log(&self, record: LogRecord) {
        self.channel.send(Message::Log(record));
    }

    /// Sends a metric sample to the parent.
    pub fn metric(&self, record: MetricRecord) {
        self.channel.send(Message::Metric(record));
    }

    pub fn increment(&self, name: &str) {
        self.metric(MetricRecord::new(MetricKind::Increment, name, 1.0));
    }

    pub fn decrement(&self, name: &str) {
        self.metric(MetricRecord::new(MetricKind::Decrement, name, 1.0));
    }

    pub fn gauge(&self, name: &str, value: f64) {
        self.metric(MetricRecord::new(MetricKind::Gauge, name, value));
    }

    pub fn timing(&self, name: &str, elapsed: Duration) {
        self.metric(MetricRecord::new(
            MetricKind::Timing,
            name,
            elapsed.as_secs_f64() * 1000.0,
        ));
    }

    /// `true` until the parent disconnects.
    pub fn connected(&self) -> bool {
        !self.channel.is_closed()
    }

    /// Waits until the parent disconnects.
    pub async fn run(&self) {
        self.channel.closed().await;
        debug!(process = %self.name, "parent disconnected");
    }

    /// Stops sending to the parent; queued messages are still flushed.
    pub fn disconnect(&self) {
        self.channel.disconnect();
    }

    async fn report_status(self, interval: Duration) {
        let period = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.channel.closed() => return,
                _ = ticker.tick() => self.events.send_as(STATUS_EVENT, &self.status()),
            }
        }
    }
}

async fn dispatch(mut inbound: Messages, responder: Responder) {
    while let Some(message) = inbound.next().await {
        if let Message::CallRequest(request) = message {
            responder.handle(request);
        }
    }
}
