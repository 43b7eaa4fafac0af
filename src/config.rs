//! # Runtime configuration.
//!
//! [`Config`] holds the settings shared by [`Scripts`](crate::Scripts) (spawning),
//! [`ChildProcess`](crate::ChildProcess) (status cadence) and
//! [`WorkerManager`](crate::WorkerManager) (supervision).
//!
//! ## Environment
//! [`Config::from_env`] reads:
//!
//! | variable             | field             | required |
//! |----------------------|-------------------|----------|
//! | `SCRIPT_PATH`        | `script_root`     | yes      |
//! | `SCRIPT_NAMESPACE`   | `namespace`       | no       |
//! | `CALL_TIMEOUT_MS`    | `call_timeout`    | no       |
//! | `STATUS_INTERVAL_MS` | `status_interval` | no       |
//!
//! Unparseable optional values are ignored with a warning and the default is kept.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::call::DEFAULT_CALL_TIMEOUT;
use crate::error::RuntimeError;
use crate::policies::RestartPolicy;

/// Directory containing worker executables.
pub const ENV_SCRIPT_PATH: &str = "SCRIPT_PATH";
/// Identity handed to each spawned worker: `<namespace>.<target>.<id>`.
pub const ENV_SCRIPT_NAME: &str = "SCRIPT_NAME";
pub const ENV_SCRIPT_NAMESPACE: &str = "SCRIPT_NAMESPACE";
pub const ENV_CALL_TIMEOUT_MS: &str = "CALL_TIMEOUT_MS";
pub const ENV_STATUS_INTERVAL_MS: &str = "STATUS_INTERVAL_MS";

/// Default interval between child `status` events.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_millis(60_000);

/// Settings for spawning and supervising workers.
///
/// ## Field semantics
/// - `script_root`: directory that worker targets are resolved against
/// - `namespace`: first segment of every worker's `SCRIPT_NAME`
/// - `call_timeout`: default deadline for calls issued on a worker channel
/// - `status_interval`: how often a child reports its uptime
/// - `bus_capacity`: lifecycle bus ring buffer size (min 1)
/// - `restart`: default restart policy, overridable per worker
/// - `grace`: bound on [`WorkerManager::stop`](crate::WorkerManager::stop); `None` waits forever
#[derive(Clone, Debug)]
pub struct Config {
    pub script_root: PathBuf,
    pub namespace: String,
    pub call_timeout: Duration,
    pub status_interval: Duration,
    pub bus_capacity: usize,
    pub restart: RestartPolicy,
    pub grace: Option<Duration>,
}

impl Default for Config {
    /// - `script_root = "."`, `namespace = "procvisor"`
    /// - `call_timeout = 10s`, `status_interval = 60s`
    /// - `bus_capacity = 1024`
    /// - `restart = RestartPolicy::unlimited()`, `grace = None`
    fn default() -> Self {
        Self {
            script_root: PathBuf::from("."),
            namespace: "procvisor".to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            status_interval: DEFAULT_STATUS_INTERVAL,
            bus_capacity: 1024,
            restart: RestartPolicy::unlimited(),
            grace: None,
        }
    }
}

impl Config {
    /// Builds a config from the process environment.
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RuntimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let script_root = lookup(ENV_SCRIPT_PATH)
            .filter(|v| !v.is_empty())
            .ok_or(RuntimeError::MissingEnv {
                name: ENV_SCRIPT_PATH,
            })?;

        let mut cfg = Config {
            script_root: PathBuf::from(script_root),
            ..Config::default()
        };
        if let Some(ns) = lookup(ENV_SCRIPT_NAMESPACE).filter(|v| !v.is_empty()) {
            cfg.namespace = ns;
        }
        if let Some(ms) = millis(&lookup, ENV_CALL_TIMEOUT_MS) {
            cfg.call_timeout = ms;
        }
        if let Some(ms) = millis(&lookup, ENV_STATUS_INTERVAL_MS) {
            cfg.status_interval = ms;
        }
        Ok(cfg)
    }

    /// Builder-style setter for the script root.
    pub fn with_script_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.script_root = root.into();
        self
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

/// Settings read by a worker about itself.
///
/// [`Scripts::fork`](crate::Scripts::fork) places every value in the child's environment.
#[derive(Clone, Debug)]
pub struct ChildConfig {
    /// `SCRIPT_NAME`: `<namespace>.<target>.<id>`.
    pub name: String,
    pub call_timeout: Duration,
    pub status_interval: Duration,
}

impl ChildConfig {
    /// Reads `SCRIPT_NAME` (required), `CALL_TIMEOUT_MS` and `STATUS_INTERVAL_MS`.
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, RuntimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup(ENV_SCRIPT_NAME)
            .filter(|v| !v.is_empty())
            .ok_or(RuntimeError::MissingEnv {
                name: ENV_SCRIPT_NAME,
            })?;
        Ok(Self {
            name,
            call_timeout: millis(&lookup, ENV_CALL_TIMEOUT_MS).unwrap_or(DEFAULT_CALL_TIMEOUT),
            status_interval: millis(&lookup, ENV_STATUS_INTERVAL_MS)
                .unwrap_or(DEFAULT_STATUS_INTERVAL),
        })
    }

    /// Named config with default timings.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }
}

fn millis<F>(lookup: &F, name: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            warn!(variable = name, value = %raw, error = %e, "ignoring invalid duration");
            None
        }
    }
}
