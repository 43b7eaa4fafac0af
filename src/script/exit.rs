//! # Exit value of a worker process.
//!
//! Reported once per process: the integer exit code if there is one, otherwise the name of
//! the terminating signal (`"SIGTERM"`), otherwise `1`.

use std::fmt;
use std::process::ExitStatus;

use serde::{Deserialize, Serialize};

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExitValue {
    /// Process exited with a status code.
    Code(i32),
    /// Process was terminated by a signal.
    Signal(String),
}

impl ExitValue {
    /// Exit value used when the OS reports neither a code nor a signal, or waiting failed.
    pub const UNKNOWN: ExitValue = ExitValue::Code(1);

    /// `true` for `Code(0)`.
    pub fn success(&self) -> bool {
        matches!(self, ExitValue::Code(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitValue::Code(code) => Some(*code),
            ExitValue::Signal(_) => None,
        }
    }

    pub fn signal(&self) -> Option<&str> {
        match self {
            ExitValue::Signal(name) => Some(name),
            ExitValue::Code(_) => None,
        }
    }
}

impl From<ExitStatus> for ExitValue {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitValue::Code(code);
        }
        signal_name(status).map_or(ExitValue::UNKNOWN, ExitValue::Signal)
    }
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> Option<String> {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;

    let raw = status.signal()?;
    Some(match Signal::try_from(raw) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("SIG{raw}"),
    })
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> Option<String> {
    None
}

impl fmt::Display for ExitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitValue::Code(code) => write!(f, "{code}"),
            ExitValue::Signal(name) => f.write_str(name),
        }
    }
}
