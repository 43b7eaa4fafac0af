//! # procvisor
//!
//! **Procvisor** supervises a fleet of worker processes and talks to them over their
//! stdin/stdout with a small message protocol: streaming remote calls in both directions,
//! named events, and log/metric forwarding from workers to the parent.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  WorkerSpec  │   │  WorkerSpec  │   │  WorkerSpec  │
//!     │  (slot #0)   │   │  (slot #1)   │   │  (slot #2)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  WorkerManager                                                    │
//! │  - slot arena (Option<Arc<ScriptProcess>> per spec)               │
//! │  - Bus (lifecycle events) ─► SubscriberSet ─► LogWriter / custom  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     SlotActor          SlotActor          SlotActor      exit ─► restart (RestartPolicy)
//!        │                  │                  │           status.uptime > limit ─► kill
//!        ▼                  ▼                  ▼
//!     Scripts::fork ──► ScriptProcess ──► Channel (NDJSON over child stdin/stdout)
//!                                           ├─ Caller / Responder   (CallRequest/CallResponse)
//!                                           ├─ EventBus             (Event)
//!                                           └─ Sink                 (Log/Metric from child)
//!
//!   worker process:  ChildProcess ──► Channel::stdio ──► same protocol, mirrored
//! ```
//!
//! ### Call lifecycle
//! ```text
//! caller                                   callee
//!   id = next_id()
//!   subscribe, send CallRequest{id} ─────► registry.resolve(target, method)
//!                                          handler(args) ─► stream
//!   yield value    ◄───────────────────── CallResponse{id, next}      (0..N)
//!   end / Err      ◄───────────────────── CallResponse{id, complete | error}
//!   Err(Timeout)   if nothing terminal within the timeout
//!   Err(Closed)    if the channel closes first
//! ```
//!
//! ## Features
//! | Area            | Description                                          | Key types                                   |
//! |-----------------|------------------------------------------------------|---------------------------------------------|
//! | **Transport**   | Duplex message channel, newline-delimited JSON       | [`Channel`], [`Message`]                    |
//! | **Calls**       | Streaming RPC with timeouts and remote errors        | [`Caller`], [`Responder`], [`Registry`]     |
//! | **Events**      | Named fire-and-forget events                         | [`EventBus`]                                |
//! | **Processes**   | Spawn, exit, kill, log/metric forwarding             | [`Scripts`], [`ScriptProcess`], [`Sink`]    |
//! | **Workers**     | The in-worker endpoint                               | [`ChildProcess`], [`ForwardLayer`]          |
//! | **Supervision** | Restart on exit, uptime limits, graceful stop        | [`WorkerManager`], [`RestartPolicy`]        |
//! | **Lifecycle**   | Observability of supervision                         | [`Event`], [`Bus`], [`Subscribe`]           |
//! | **Errors**      | Typed errors per concern                             | [`RuntimeError`], [`CallError`], [`RemoteError`] |
//!
//! ## Example
//! A worker exposing one method:
//! ```no_run
//! use procvisor::{ChildProcess, Registry, RemoteError, Target};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Registry::builder()
//!         .target(Target::new("Math").typed("double", |(n,): (i64,)| async move {
//!             Ok::<_, RemoteError>(n * 2)
//!         }))
//!         .build()?;
//!
//!     let child = ChildProcess::from_env(registry)?;
//!     child.run().await;
//!     Ok(())
//! }
//! ```
//!
//! The parent calling it:
//! ```no_run
//! use procvisor::{Config, Scripts};
//! use serde_json::json;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let scripts = Scripts::new(&Config::from_env()?)?;
//! let worker = scripts.fork("math-worker", &[])?;
//! let four: i64 = worker.call_value("Math", "double", vec![json!(2)]).await?;
//! assert_eq!(four, 4);
//! worker.disconnect();
//! worker.exit().await;
//! # Ok(())
//! # }
//! ```

mod call;
mod channel;
mod child;
mod config;
mod duration;
mod error;
mod events;
mod manager;
mod policies;
mod script;
mod sinks;
mod subscribers;

// ---- Public re-exports ----

pub use call::{
    CallStream, Caller, DEFAULT_CALL_TIMEOUT, Handler, Registry, RegistryBuilder, Responder,
    Target, ValueStream,
};
pub use channel::{
    CallRequest, CallResponse, Channel, EventMessage, Message, Messages, Reply,
};
pub use child::{ChildProcess, ForwardLayer, ProcessStatus, STATUS_EVENT};
pub use config::{
    ChildConfig, Config, DEFAULT_STATUS_INTERVAL, ENV_CALL_TIMEOUT_MS, ENV_SCRIPT_NAME,
    ENV_SCRIPT_NAMESPACE, ENV_SCRIPT_PATH, ENV_STATUS_INTERVAL_MS,
};
pub use duration::parse_duration;
pub use error::{CallError, RegistryError, RemoteError, RuntimeError};
pub use events::{Bus, Event, EventBus, EventKind};
pub use manager::{WorkerManager, WorkerSpec, wait_for_shutdown_signal};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use script::{ExitValue, ScriptProcess, Scripts};
pub use sinks::{LogLevel, LogRecord, MetricKind, MetricRecord, Sink, TracingSink};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
