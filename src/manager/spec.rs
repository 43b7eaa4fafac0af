//! # Worker specification.
//!
//! A [`WorkerSpec`] names a script under the script root and how its slot is supervised.
//! Specs deserialize from the camelCase shape used by service configs:
//!
//! ```json
//! { "name": "worker.sh", "uptimeLimit": "PT1H", "args": ["--fast"] }
//! ```

use serde::Deserialize;

use crate::policies::RestartPolicy;

/// What to run in one worker slot.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Script file name relative to the script root.
    pub name: String,
    /// Maximum uptime as an ISO8601 duration (`"PT1H"`); `None` never force-restarts.
    #[serde(default)]
    pub uptime_limit: Option<String>,
    /// Command-line arguments passed to the script.
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides the manager-wide [`Config::restart`](crate::Config::restart).
    #[serde(skip)]
    pub restart: Option<RestartPolicy>,
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_uptime_limit(mut self, limit: impl Into<String>) -> Self {
        self.uptime_limit = Some(limit.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = Some(restart);
        self
    }
}
