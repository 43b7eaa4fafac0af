//! # WorkerManager: a positional set of supervised worker processes.
//!
//! ```text
//! WorkerManager::new(cfg, scripts, specs)
//!
//! start():
//!   ├─► parse every uptime limit, check every script exists   (fail before forking)
//!   ├─► listener: Bus.subscribe() ─► SubscriberSet::emit       (fire-and-forget)
//!   └─► for (i, spec) in specs:
//!         ├─► fork into slot i, publish WorkerStarting
//!         └─► spawn SlotActor::run(process, root.child_token())
//!
//!   fork failure ─► force_kill + await the forked ones, stay Idle, Err
//!
//! stop():
//!   ├─► not running ─► Ok (no state change)
//!   ├─► publish StopRequested
//!   ├─► root.cancel(); join every SlotActor          (no relaunch from here on)
//!   ├─► disconnect every connected worker
//!   ├─► wait for their exits (bounded by cfg.grace if set)
//!   │      └─ grace exceeded ─► publish GraceExceeded, force_kill, Err(GraceExceeded)
//!   └─► clear slots, publish AllStopped
//! ```
//!
//! ## Example
//! ```no_run
//! use procvisor::{Config, Scripts, WorkerManager, WorkerSpec};
//!
//! # async fn demo() -> Result<(), procvisor::RuntimeError> {
//! let cfg = Config::from_env()?;
//! let scripts = Scripts::new(&cfg)?;
//! let manager = WorkerManager::new(
//!     cfg,
//!     scripts,
//!     vec![
//!         WorkerSpec::new("indexer"),
//!         WorkerSpec::new("mailer").with_uptime_limit("PT6H"),
//!     ],
//! );
//! manager.run_until_signal().await
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::duration::parse_duration;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::manager::shutdown;
use crate::manager::slot::{SlotActor, Slots};
use crate::manager::spec::WorkerSpec;
use crate::script::{ExitValue, ScriptProcess, Scripts};
use crate::subscribers::{LogWriter, Subscribe, SubscriberSet};

/// A forked slot that has not been handed to its supervision loop yet.
type Launched = (SlotActor, Arc<ScriptProcess>);

/// Per-slot control handles while running.
struct SlotControl {
    token: CancellationToken,
    actor: Option<JoinHandle<()>>,
}

struct Running {
    token: CancellationToken,
    controls: Vec<SlotControl>,
    listener: JoinHandle<()>,
    listener_stop: CancellationToken,
    subs: Arc<SubscriberSet>,
}

enum Lifecycle {
    Idle,
    Running(Running),
    Stopped,
}

/// Supervises one worker process per [`WorkerSpec`].
pub struct WorkerManager {
    cfg: Config,
    scripts: Arc<Scripts>,
    specs: Vec<Arc<WorkerSpec>>,
    bus: Bus,
    slots: Slots,
    subscribers: Mutex<Vec<Arc<dyn Subscribe>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl WorkerManager {
    /// Creates a manager; nothing is spawned until [`start`](Self::start).
    ///
    /// Lifecycle events are written through [`LogWriter`] unless
    /// [`with_subscribers`](Self::with_subscribers) replaces it.
    pub fn new(cfg: Config, scripts: Scripts, specs: Vec<WorkerSpec>) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let slots = Arc::new(RwLock::new(vec![None; specs.len()]));
        Self {
            cfg,
            scripts: Arc::new(scripts),
            specs: specs.into_iter().map(Arc::new).collect(),
            bus,
            slots,
            subscribers: Mutex::new(vec![Arc::new(LogWriter)]),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Replaces the lifecycle event subscribers.
    pub fn with_subscribers(self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        *self.subscribers.lock() = subscribers;
        self
    }

    /// Lifecycle event bus; subscribe before [`start`](Self::start) to see every event.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn specs(&self) -> impl Iterator<Item = &WorkerSpec> {
        self.specs.iter().map(AsRef::as_ref)
    }

    /// Snapshot of the slots; `None` where no process is running.
    pub fn workers(&self) -> Vec<Option<Arc<ScriptProcess>>> {
        self.slots.read().clone()
    }

    /// Process currently in slot `index`.
    pub fn worker(&self, index: usize) -> Option<Arc<ScriptProcess>> {
        self.slots.read().get(index).cloned().flatten()
    }

    /// Forks every worker and starts supervising them.
    ///
    /// Uptime limits and script paths are validated before anything is forked. If a fork
    /// fails, the workers already forked are force-killed and awaited before the error is
    /// returned; the manager stays idle with its subscribers intact, so `start` may be retried.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let Err((err, aborted)) = self.launch() else {
            return Ok(());
        };
        for (actor, process) in aborted {
            let exit = process.exit().await;
            actor.bus.publish(
                actor
                    .event(EventKind::WorkerExited)
                    .with_process(process.id())
                    .with_reason(exit.to_string()),
            );
        }
        Err(err)
    }

    /// Forks every slot and moves to `Running`; on a fork failure returns the error with the
    /// already-forked (and force-killed) slots.
    fn launch(&self) -> Result<(), (RuntimeError, Vec<Launched>)> {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err((RuntimeError::AlreadyStarted, Vec::new()));
        }

        let mut limits = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let limit = spec.uptime_limit.as_deref().map(parse_duration).transpose();
            limits.push(limit.map_err(|e| (e, Vec::new()))?);
            let path = self.scripts.root().join(&spec.name);
            if !path.is_file() {
                return Err((RuntimeError::ScriptNotFound { path }, Vec::new()));
            }
        }

        // Subscribed before the first fork so the listener sees every WorkerStarting.
        let rx = self.bus.subscribe();
        let mut started: Vec<Launched> = Vec::with_capacity(self.specs.len());
        for (index, (spec, uptime_limit)) in self.specs.iter().zip(limits).enumerate() {
            let actor = SlotActor {
                index,
                spec: Arc::clone(spec),
                uptime_limit,
                restart: spec.restart.unwrap_or(self.cfg.restart),
                scripts: Arc::clone(&self.scripts),
                slots: Arc::clone(&self.slots),
                bus: self.bus.clone(),
            };
            match actor.fork(0) {
                Ok(process) => started.push((actor, process)),
                Err(e) => {
                    error!(worker = %spec.name, error = %e, "start aborted");
                    for (_, process) in &started {
                        process.force_kill();
                    }
                    self.slots.write().iter_mut().for_each(|slot| *slot = None);
                    return Err((e, started));
                }
            }
        }

        let subs = Arc::new(SubscriberSet::new(
            std::mem::take(&mut *self.subscribers.lock()),
            self.bus.clone(),
        ));
        let listener_stop = CancellationToken::new();
        let listener = spawn_listener(rx, Arc::clone(&subs), listener_stop.clone());
        let token = CancellationToken::new();

        let controls = started
            .into_iter()
            .map(|(actor, process)| {
                let slot_token = token.child_token();
                let handle = tokio::spawn(actor.run(process, slot_token.clone()));
                SlotControl {
                    token: slot_token,
                    actor: Some(handle),
                }
            })
            .collect();

        info!(workers = self.specs.len(), "worker manager started");
        *lifecycle = Lifecycle::Running(Running {
            token,
            controls,
            listener,
            listener_stop,
            subs,
        });
        Ok(())
    }

    /// Disables restarts, asks every connected worker to exit, and waits for them.
    ///
    /// With [`Config::grace`] set, workers still running after it elapses are force-killed and
    /// [`RuntimeError::GraceExceeded`] is returned once they are gone.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        let running = {
            let mut lifecycle = self.lifecycle.lock();
            if !matches!(*lifecycle, Lifecycle::Running(_)) {
                return Ok(());
            }
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(running) => running,
                Lifecycle::Idle | Lifecycle::Stopped => return Ok(()),
            }
        };
        self.bus.publish(Event::new(EventKind::StopRequested));

        running.token.cancel();
        for control in running.controls {
            if let Some(actor) = control.actor {
                let _ = actor.await;
            }
        }

        let connected: Vec<Arc<ScriptProcess>> = self
            .slots
            .read()
            .iter()
            .flatten()
            .filter(|p| p.connected())
            .cloned()
            .collect();
        let result = self.drain(connected).await;

        self.slots.write().iter_mut().for_each(|slot| *slot = None);
        self.bus.publish(Event::new(EventKind::AllStopped));

        running.listener_stop.cancel();
        let _ = running.listener.await;
        if let Ok(subs) = Arc::try_unwrap(running.subs) {
            subs.shutdown().await;
        }
        result
    }

    /// Stops the first slot running `name` and returns its exit value.
    ///
    /// The slot is not restarted afterwards. Returns `Ok(None)` if the slot had no
    /// running process.
    pub async fn stop_worker(&self, name: &str) -> Result<Option<ExitValue>, RuntimeError> {
        let index = self
            .specs
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RuntimeError::WorkerNotFound {
                name: name.to_string(),
            })?;

        let actor = match &mut *self.lifecycle.lock() {
            Lifecycle::Running(running) => {
                let control = &mut running.controls[index];
                control.token.cancel();
                control.actor.take()
            }
            Lifecycle::Idle | Lifecycle::Stopped => None,
        };
        if let Some(actor) = actor {
            let _ = actor.await;
        }

        let Some(process) = self.slots.write()[index].take() else {
            return Ok(None);
        };
        debug!(worker = name, process = process.name(), "STOP");
        process.disconnect();
        let exit = match self.cfg.grace {
            Some(grace) => match tokio::time::timeout(grace, process.exit()).await {
                Ok(exit) => exit,
                Err(_) => {
                    process.force_kill();
                    process.exit().await
                }
            },
            None => process.exit().await,
        };
        Ok(Some(exit))
    }

    /// Starts, waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then stops.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        self.start().await?;
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "shutdown signal received"),
            Err(e) => error!(error = %e, "signal handlers unavailable, stopping"),
        }
        self.stop().await
    }

    async fn drain(&self, workers: Vec<Arc<ScriptProcess>>) -> Result<(), RuntimeError> {
        if workers.is_empty() {
            return Ok(());
        }
        for worker in &workers {
            worker.disconnect();
        }

        let all_exited = join_all(workers.iter().map(|w| w.exit()));
        let Some(grace) = self.cfg.grace else {
            all_exited.await;
            return Ok(());
        };
        if tokio::time::timeout(grace, all_exited).await.is_ok() {
            return Ok(());
        }

        let stuck: Vec<&Arc<ScriptProcess>> =
            workers.iter().filter(|w| w.exit_value().is_none()).collect();
        let names: Vec<String> = stuck.iter().map(|w| w.name().to_string()).collect();
        self.bus
            .publish(Event::new(EventKind::GraceExceeded).with_reason(names.join(",")));
        for worker in &stuck {
            worker.force_kill();
        }
        join_all(stuck.iter().map(|w| w.exit())).await;
        Err(grace_exceeded(grace, names))
    }
}

/// Forwards bus events to the subscriber set until `stop` is cancelled and the
/// backlog is drained.
fn spawn_listener(
    mut rx: broadcast::Receiver<Event>,
    subs: Arc<SubscriberSet>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                biased;
                received = rx.recv() => received,
                _ = stop.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        subs.emit(ev);
                    }
                    return;
                }
            };
            match received {
                Ok(ev) => subs.emit(ev),
                Err(RecvError::Lagged(n)) => debug!(skipped = n, "lifecycle listener lagged"),
                Err(RecvError::Closed) => return,
            }
        }
    })
}

fn grace_exceeded(grace: Duration, stuck: Vec<String>) -> RuntimeError {
    RuntimeError::GraceExceeded { grace, stuck }
}
