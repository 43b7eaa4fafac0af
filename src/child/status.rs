use serde::{Deserialize, Serialize};

/// Name of the periodic status event a worker sends to its parent.
pub const STATUS_EVENT: &str = "status";

/// Payload of the `status` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    /// Worker's `SCRIPT_NAME`.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pid: u32,
    /// Seconds since the worker started.
    pub uptime: f64,
}
