//! # Log and metric records, and the sinks that receive them.
//!
//! Children forward their log lines and metric samples to the parent as
//! [`Message::Log`](crate::Message::Log) / [`Message::Metric`](crate::Message::Metric).
//! The parent hands them to a [`Sink`] together with the child's identity
//! (`<namespace>.<target>.<id>`).
//!
//! [`TracingSink`] is the default: it re-emits records as `tracing` events on the
//! `procvisor::child` target so they end up wherever the parent's subscriber writes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Syslog-style severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Informational,
    Debug,
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Informational,
            _ => LogLevel::Debug,
        }
    }
}

/// Structured log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    /// Arbitrary structured fields (an object, or `null`).
    #[serde(default)]
    pub metadata: Value,
    /// Extra positional values.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl LogRecord {
    /// Creates a record without metadata or args.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            metadata: Value::Null,
            args: Vec::new(),
        }
    }
}

/// Kind of metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Increment,
    Decrement,
    Gauge,
    Timing,
}

/// Structured metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl MetricRecord {
    /// Creates a sample without tags.
    pub fn new(kind: MetricKind, name: impl Into<String>, value: f64) -> Self {
        Self {
            kind,
            name: name.into(),
            value,
            tags: BTreeMap::new(),
        }
    }

    /// Adds one tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Destination for records forwarded by child processes.
///
/// Called from the per-process message task; implementations must not block.
pub trait Sink: Send + Sync + 'static {
    /// Delivers a log record emitted by `source`.
    fn log(&self, source: &str, record: &LogRecord);

    /// Delivers a metric sample emitted by `source`.
    fn metric(&self, source: &str, record: &MetricRecord);
}

/// Re-emits child records through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn log(&self, source: &str, r: &LogRecord) {
        let meta = &r.metadata;
        match r.level {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                tracing::error!(target: "procvisor::child", source, level = ?r.level, %meta, "{}", r.message)
            }
            LogLevel::Warning => {
                tracing::warn!(target: "procvisor::child", source, %meta, "{}", r.message)
            }
            LogLevel::Notice | LogLevel::Informational => {
                tracing::info!(target: "procvisor::child", source, %meta, "{}", r.message)
            }
            LogLevel::Debug => {
                tracing::debug!(target: "procvisor::child", source, %meta, "{}", r.message)
            }
        }
    }

    fn metric(&self, source: &str, r: &MetricRecord) {
        tracing::debug!(
            target: "procvisor::metric",
            source,
            kind = ?r.kind,
            name = %r.name,
            value = r.value,
            tags = ?r.tags,
            "metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_type_field_name() {
        let m = MetricRecord::new(MetricKind::Timing, "call.duration", 12.5).with_tag("target", "Test");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(
            v,
            json!({"type": "timing", "name": "call.duration", "value": 12.5, "tags": {"target": "Test"}})
        );
    }

    #[test]
    fn test_log_record_defaults() {
        let r: LogRecord = serde_json::from_value(json!({"level": "warning", "message": "hi"})).unwrap();
        assert_eq!(r, LogRecord::new(LogLevel::Warning, "hi"));
    }

    #[test]
    fn test_level_order_is_by_severity() {
        assert!(LogLevel::Emergency < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Debug);
        assert_eq!(LogLevel::from(tracing::Level::TRACE), LogLevel::Debug);
    }
}
