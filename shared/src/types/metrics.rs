//! Metrics samples and host liveness types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Point-in-time system snapshot, values rounded to 2 decimals by the agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub disk_percent: f64,
    /// 1-minute load average
    #[serde(default)]
    pub load_avg: f64,
}

impl Metrics {
    pub fn new(cpu_percent: f64, memory_percent: f64, disk_percent: f64, load_avg: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            disk_percent,
            load_avg,
        }
    }
}

/// A metrics reading tagged with its source host and arrival time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEntry {
    pub timestamp: String,
    pub server: String,
    pub metrics: Metrics,
}

/// Liveness classification derived from time since last contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Online,
    Timeout,
    Offline,
    Unknown,
}

impl HostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Timeout => "timeout",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status row for one host. Never stored; computed on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub server: String,
    pub status: HostState,
    pub last_seen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<Metrics>,
}
