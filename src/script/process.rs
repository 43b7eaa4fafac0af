//! # Handle to one spawned worker process.
//!
//! A [`ScriptProcess`] owns the parent side of a worker's channel and two background tasks:
//!
//! ```text
//!   child stdout ──► Channel ──► dispatcher ──┬─ Log          ──► Sink::log(name, ..)
//!                                            ├─ Metric       ──► Sink::metric(name, ..)
//!                                            └─ CallRequest  ──► Responder (parent registry)
//!
//!   child.wait() ──► supervisor task ──► EXIT ──► channel.close() ──► exit watch = Some(value)
//! ```
//!
//! ## Rules
//! - The exit value is published exactly once; [`ScriptProcess::exit`] resolves immediately
//!   for a process that has already exited.
//! - Once exit fires the channel is closed: pending calls fail with `Closed`, listeners end.
//! - A handle is inert after exit; `kill`/`disconnect` become no-ops.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::call::{CallStream, Caller, Registry, Responder};
use crate::channel::{Channel, Message, Messages};
use crate::error::{CallError, RuntimeError};
use crate::events::EventBus;
use crate::script::exit::ExitValue;
use crate::sinks::Sink;

/// How long buffered child output may still be read after the process exits.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Parent-side handle to a worker process.
pub struct ScriptProcess {
    target: Arc<str>,
    id: u64,
    name: Arc<str>,
    pid: Option<u32>,
    channel: Channel,
    caller: Caller,
    events: EventBus,
    exit: watch::Receiver<Option<ExitValue>>,
    force: CancellationToken,
}

impl ScriptProcess {
    /// Wires a freshly spawned child (stdin/stdout piped) to a channel.
    pub(crate) fn attach(
        target: &str,
        id: u64,
        name: String,
        mut child: Child,
        registry: Arc<Registry>,
        sink: Arc<dyn Sink>,
        call_timeout: Duration,
    ) -> Result<Self, RuntimeError> {
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(RuntimeError::Spawn {
                    target: target.to_string(),
                    source: std::io::Error::other("child stdio is not piped"),
                });
            }
        };

        let name: Arc<str> = name.into();
        let pid = child.id();
        let (channel, inbound) = Channel::open(Arc::clone(&name), stdout, stdin);
        let (exit_tx, exit_rx) = watch::channel(None);
        let force = CancellationToken::new();

        tokio::spawn(dispatch(
            inbound,
            Arc::clone(&name),
            Responder::new(channel.clone(), registry),
            sink,
        ));
        tokio::spawn(supervise(
            child,
            Arc::clone(&name),
            channel.clone(),
            force.clone(),
            exit_tx,
        ));

        Ok(Self {
            target: target.into(),
            id,
            name,
            pid,
            caller: Caller::new(channel.clone(), call_timeout),
            events: EventBus::new(channel.clone()),
            channel,
            exit: exit_rx,
            force,
        })
    }

    /// Script file name the process was forked from.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Spawn counter of the owning [`Scripts`](crate::Scripts).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `<namespace>.<target>.<id>`, also the child's `SCRIPT_NAME`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id, if the OS reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Calls `target.method(args)` in the child.
    pub fn call(&self, target: &str, method: &str, args: Vec<Value>) -> CallStream {
        self.caller.call(target, method, args)
    }

    pub fn call_with_timeout(
        &self,
        target: &str,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> CallStream {
        self.caller.call_with_timeout(target, method, args, timeout)
    }

    /// Calls `target.method(args)` in the child and decodes the last value.
    pub async fn call_value<T: DeserializeOwned>(
        &self,
        target: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, CallError> {
        self.caller.call_value(target, method, args).await
    }

    /// Sends a named event to the child.
    pub fn event(&self, name: &str, data: Value) {
        self.events.send(name, data);
    }

    /// Named events sent by the child.
    pub fn listen(&self, name: &str) -> impl Stream<Item = Value> + Send + 'static {
        self.events.listen(name)
    }

    pub fn listen_as<T>(&self, name: &str) -> impl Stream<Item = T> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.events.listen_as(name)
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    /// `true` while the channel is open and the process has not exited.
    pub fn connected(&self) -> bool {
        self.exit.borrow().is_none() && self.channel.is_connected()
    }

    /// Exit value, if the process has exited.
    pub fn exit_value(&self) -> Option<ExitValue> {
        self.exit.borrow().clone()
    }

    /// Waits for the process to exit.
    pub async fn exit(&self) -> ExitValue {
        let mut rx = self.exit.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone().unwrap_or(ExitValue::UNKNOWN),
            Err(_) => ExitValue::UNKNOWN,
        }
    }

    /// Closes the child's stdin; a well-behaved worker exits once it sees end of input.
    pub fn disconnect(&self) {
        debug!(process = %self.name, "DISCONNECT");
        self.channel.disconnect();
    }

    /// Requests graceful termination (`SIGTERM` on unix, a hard kill elsewhere).
    pub fn kill(&self) {
        if self.exit.borrow().is_some() {
            return;
        }
        debug!(process = %self.name, "KILL");
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) {
                if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                    warn!(process = %self.name, error = %e, "SIGTERM failed");
                }
                return;
            }
        }
        self.force_kill();
    }

    /// Terminates the process immediately (`SIGKILL` on unix).
    pub fn force_kill(&self) {
        self.force.cancel();
    }
}

impl std::fmt::Debug for ScriptProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("exit", &*self.exit.borrow())
            .finish()
    }
}

async fn dispatch(
    mut inbound: Messages,
    name: Arc<str>,
    responder: Responder,
    sink: Arc<dyn Sink>,
) {
    while let Some(message) = inbound.next().await {
        match message {
            Message::Log(record) => sink.log(&name, &record),
            Message::Metric(record) => sink.metric(&name, &record),
            Message::CallRequest(request) => {
                responder.handle(request);
            }
            Message::CallResponse(_) | Message::Event(_) | Message::User(_) => {}
        }
    }
}

async fn supervise(
    mut child: Child,
    name: Arc<str>,
    channel: Channel,
    force: CancellationToken,
    exit: watch::Sender<Option<ExitValue>>,
) {
    let mut killing = false;
    let value = loop {
        tokio::select! {
            status = child.wait() => break match status {
                Ok(status) => ExitValue::from(status),
                Err(e) => {
                    error!(process = %name, error = %e, "waiting for process failed");
                    ExitValue::UNKNOWN
                }
            },
            _ = force.cancelled(), if !killing => {
                killing = true;
                if let Err(e) = child.start_kill() {
                    warn!(process = %name, error = %e, "kill failed");
                }
            }
        }
    };

    debug!(process = %name, exit = %value, "EXIT");
    let _ = tokio::time::timeout(DRAIN_TIMEOUT, channel.closed()).await;
    channel.close();
    let _ = exit.send_replace(Some(value));
}
