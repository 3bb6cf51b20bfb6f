//! Log entry type
//!
//! A `LogEntry` is what agents push to `/api/logs`. Entries are immutable once
//! ingested: they sit in the aggregator's memory buffer until compaction, and
//! afterwards only exist as compressed lines on disk.

use crate::types::metrics::{Metrics, MetricsEntry};
use serde::{Deserialize, Serialize};

/// A single log line as pushed by an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local time in `YYYY-MM-DD HH:MM:SS` layout
    #[serde(default)]
    pub timestamp: String,

    /// Free-form severity (INFO, WARN, ERROR, ...)
    #[serde(default)]
    pub level: String,

    /// Reporting host
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub message: String,

    /// Optional system snapshot piggybacked on the log push
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl LogEntry {
    /// Create an entry without attached metrics
    pub fn new(
        timestamp: impl Into<String>,
        level: impl Into<String>,
        server: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            level: level.into(),
            server: server.into(),
            message: message.into(),
            metrics: None,
        }
    }

    /// Render as `[timestamp] [level] [server] message` (no trailing newline).
    ///
    /// The message is not escaped; an embedded newline splits the entry in two
    /// once it has been written to disk.
    pub fn to_line(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp, self.level, self.server, self.message
        )
    }

    /// The metrics sample carried by this entry, tagged with its host.
    ///
    /// Returns `None` when there is no snapshot or no server name to file it under.
    pub fn metrics_entry(&self) -> Option<MetricsEntry> {
        match self.metrics {
            Some(metrics) if !self.server.is_empty() => Some(MetricsEntry {
                timestamp: self.timestamp.clone(),
                server: self.server.clone(),
                metrics,
            }),
            _ => None,
        }
    }
}
