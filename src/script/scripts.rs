//! # Spawning worker processes from a script root.
//!
//! [`Scripts`] resolves a target name against its root directory and forks it with a
//! [`Channel`](crate::Channel) on the child's stdin/stdout.
//!
//! ## Child environment
//! The parent environment plus:
//! - `SCRIPT_NAME = <namespace>.<target>.<id>` (`id` counts forks of this `Scripts`, from 1)
//! - `CALL_TIMEOUT_MS`, `STATUS_INTERVAL_MS` from the [`Config`]
//!
//! stderr is inherited so a worker's panics and fallback logs stay visible.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::call::Registry;
use crate::config::{Config, ENV_CALL_TIMEOUT_MS, ENV_SCRIPT_NAME, ENV_STATUS_INTERVAL_MS};
use crate::error::RuntimeError;
use crate::script::process::ScriptProcess;
use crate::sinks::{Sink, TracingSink};

/// Worker process spawner.
pub struct Scripts {
    root: PathBuf,
    namespace: String,
    call_timeout: Duration,
    status_interval: Duration,
    counter: AtomicU64,
    registry: Arc<Registry>,
    sink: Arc<dyn Sink>,
}

impl Scripts {
    /// Creates a spawner rooted at `config.script_root`.
    ///
    /// Parent-side calls from workers are answered from an empty registry and their
    /// log/metric records go to [`TracingSink`] until replaced.
    pub fn new(config: &Config) -> Result<Self, RuntimeError> {
        let root = std::fs::canonicalize(&config.script_root)
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| RuntimeError::ScriptRootInvalid {
                path: config.script_root.clone(),
            })?;
        debug!(root = %root.display(), "SCRIPT_PATH");

        Ok(Self {
            root,
            namespace: config.namespace.clone(),
            call_timeout: config.call_timeout,
            status_interval: config.status_interval,
            counter: AtomicU64::new(0),
            registry: Registry::empty(),
            sink: Arc::new(TracingSink),
        })
    }

    /// Targets and methods workers may call in the parent.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Receiver of workers' log and metric records.
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    /// Canonical script root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Forks `target` with `args`.
    ///
    /// Fails synchronously if the script does not exist or cannot be spawned.
    /// Must be called inside a tokio runtime.
    pub fn fork(&self, target: &str, args: &[String]) -> Result<ScriptProcess, RuntimeError> {
        let path = self.root.join(target);
        if !path.is_file() {
            return Err(RuntimeError::ScriptNotFound { path });
        }

        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}.{}.{}", self.namespace, target, id);

        let child = Command::new(&path)
            .args(args)
            .env(ENV_SCRIPT_NAME, &name)
            .env(ENV_CALL_TIMEOUT_MS, self.call_timeout.as_millis().to_string())
            .env(
                ENV_STATUS_INTERVAL_MS,
                self.status_interval.as_millis().to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                target: target.to_string(),
                source,
            })?;

        debug!(process = %name, pid = ?child.id(), "FORK {}", path.display());
        ScriptProcess::attach(
            target,
            id,
            name,
            child,
            Arc::clone(&self.registry),
            Arc::clone(&self.sink),
            self.call_timeout,
        )
    }
}
