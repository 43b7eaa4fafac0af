//! Error types used by the procvisor runtime, the call protocol, and target handlers.
//!
//! This module defines:
//!
//! - [`RuntimeError`]: errors raised by process spawning and worker supervision.
//! - [`CallError`]: errors observed by the side that *issued* a remote call.
//! - [`RemoteError`]: the cross-process projection of a handler failure (`name`/`message`/`stack`).
//! - [`RegistryError`]: errors raised while building a [`Registry`](crate::Registry).
//!
//! All enums provide `as_label` for logs/metrics, like the lifecycle events do.
//!
//! ## Error identity across the boundary
//! A [`RemoteError`] keeps only `name`, `message` and `stack`. The concrete Rust type of the
//! failure in the remote process is not recoverable on the calling side; match on `name` instead.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Errors produced by the procvisor runtime.
///
/// Spawn failures are raised synchronously from [`Scripts::fork`](crate::Scripts::fork);
/// supervision failures are raised from [`WorkerManager`](crate::WorkerManager) operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The resolved script path does not exist or is not a file.
    #[error("script not found: {path}")]
    ScriptNotFound {
        /// Resolved path that was checked.
        path: PathBuf,
    },

    /// The configured script root is not a directory.
    #[error("script root is not a directory: {path}")]
    ScriptRootInvalid {
        /// Configured root path.
        path: PathBuf,
    },

    /// The OS refused to spawn the process.
    #[error("failed to spawn {target}: {source}")]
    Spawn {
        /// Target the spawn was attempted for.
        target: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An uptime limit is not a valid ISO8601 duration.
    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration {
        /// Raw input value.
        value: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A required environment variable is missing.
    #[error("missing environment variable {name}")]
    MissingEnv {
        /// Variable name.
        name: &'static str,
    },

    /// `start()` was called on a manager that is already running.
    #[error("worker manager already started")]
    AlreadyStarted,

    /// No worker slot with that name exists.
    #[error("worker not found: {name}")]
    WorkerNotFound {
        /// Requested worker name.
        name: String,
    },

    /// Stop grace period was exceeded; the listed workers had to be force-killed.
    #[error("stop grace {grace:?} exceeded; killed: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the workers that did not exit in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Stable snake_case label, usable as a log field or metric tag.
    ///
    /// # Example
    /// ```
    /// use procvisor::RuntimeError;
    ///
    /// let err = RuntimeError::AlreadyStarted;
    /// assert_eq!(err.as_label(), "runtime_already_started");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::ScriptNotFound { .. } => "runtime_script_not_found",
            RuntimeError::ScriptRootInvalid { .. } => "runtime_script_root_invalid",
            RuntimeError::Spawn { .. } => "runtime_spawn_failed",
            RuntimeError::InvalidDuration { .. } => "runtime_invalid_duration",
            RuntimeError::MissingEnv { .. } => "runtime_missing_env",
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::WorkerNotFound { .. } => "runtime_worker_not_found",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Serialized failure of a remote call.
///
/// This is both the payload of an `error` [`CallResponse`](crate::CallResponse) and the error
/// value handlers may return to choose the `name` seen by the caller.
///
/// Missing fields decode as empty strings.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct RemoteError {
    /// Error class name (e.g. `"TargetNotFound"`, `"TypeError"`).
    #[serde(default)]
    pub name: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Free-form trace captured where the error was raised.
    #[serde(default)]
    pub stack: String,
}

impl RemoteError {
    /// Creates an error with an empty stack.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: String::new(),
        }
    }

    /// Attaches a stack/trace string.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    /// Target name was not registered.
    pub fn target_not_found(target: &str) -> Self {
        Self::new("TargetNotFound", format!("target {target:?} is not registered"))
    }

    /// Method name was not registered on an existing target.
    pub fn method_not_found(target: &str, method: &str) -> Self {
        Self::new(
            "MethodNotFound",
            format!("method {method:?} is not registered on target {target:?}"),
        )
    }
}

impl From<anyhow::Error> for RemoteError {
    /// Projects an `anyhow::Error` onto `name`/`message`/`stack`.
    ///
    /// A wrapped [`RemoteError`] is passed through unchanged; anything else becomes
    /// `name = "Error"` with the full context chain as `stack`.
    fn from(err: anyhow::Error) -> Self {
        if let Some(remote) = err.downcast_ref::<RemoteError>() {
            return remote.clone();
        }
        Self {
            name: "Error".to_string(),
            message: err.to_string(),
            stack: format!("{err:?}"),
        }
    }
}

/// # Errors observed by the caller of a remote method.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CallError {
    /// No terminal response arrived within the call timeout.
    #[error("call {target}.{method} (id {id}) timed out after {timeout:?}")]
    Timeout {
        /// Target name.
        target: String,
        /// Method name.
        method: String,
        /// Local call id.
        id: u64,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The channel closed (process exited or disconnected) before the call terminated.
    #[error("channel closed before call {id} completed")]
    Closed {
        /// Local call id.
        id: u64,
    },

    /// The remote side answered with an error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The call completed without producing a value where one was required.
    #[error("call {target}.{method} completed without a value")]
    Empty {
        /// Target name.
        target: String,
        /// Method name.
        method: String,
    },

    /// A produced value could not be decoded into the requested type.
    #[error("failed to decode call result: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CallError {
    /// Stable snake_case label, usable as a log field or metric tag.
    ///
    /// # Example
    /// ```
    /// use procvisor::CallError;
    ///
    /// let err = CallError::Closed { id: 3 };
    /// assert_eq!(err.as_label(), "call_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CallError::Timeout { .. } => "call_timeout",
            CallError::Closed { .. } => "call_closed",
            CallError::Remote(_) => "call_remote",
            CallError::Empty { .. } => "call_empty",
            CallError::Decode(_) => "call_decode",
        }
    }

    /// Returns the remote error if the call failed on the other side.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            CallError::Remote(e) => Some(e),
            _ => None,
        }
    }

    /// Indicates whether the failure was a local timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }
}

impl From<CallError> for RemoteError {
    /// Relays a failed nested call: remote errors pass through, local failures become
    /// `name = "CallError"`.
    fn from(err: CallError) -> Self {
        match err {
            CallError::Remote(remote) => remote,
            other => RemoteError::new("CallError", other.to_string()),
        }
    }
}

/// # Errors raised while building a registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A target with this name was already registered.
    #[error("target {0:?} registered twice")]
    DuplicateTarget(String),

    /// A method with this name was already registered on the target.
    #[error("method {target:?}.{method:?} registered twice")]
    DuplicateMethod {
        /// Target name.
        target: String,
        /// Method name.
        method: String,
    },
}
