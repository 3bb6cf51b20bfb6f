//! Aggregator configuration
//!
//! Every setting has a default and can be overridden through a `MINILOG_*`
//! environment variable. Unparsable values fall back to the default.

use crate::storage::logs::{DEFAULT_MAX_BUFFER_BYTES, DEFAULT_MAX_BUFFER_SIZE};
use crate::storage::series::DEFAULT_MAX_POINTS_PER_SERVER;
use minilog_shared::utils::parse_duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Listen address for the HTTP API
    pub listen_addr: String,

    /// Directory for hourly chunk files and metrics aggregates
    pub data_dir: PathBuf,

    /// Buffered log entries that trigger an early compaction
    pub max_buffer_size: usize,

    /// Buffer size in bytes above which a warning is logged. Not a flush trigger.
    pub max_buffer_bytes: usize,

    /// Timer-driven compaction period
    pub flush_interval: Duration,

    /// Ring store capacity per host
    pub max_points_per_server: usize,

    /// How often hourly metrics aggregates are written
    pub persist_interval: Duration,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_duration_or(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| parse_duration(&s).ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(default)
}

fn megabytes(mb: usize) -> usize {
    mb.saturating_mul(1024 * 1024)
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: std::env::var("MINILOG_LISTEN")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            data_dir: std::env::var("MINILOG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            max_buffer_size: env_or("MINILOG_MAX_BUFFER_SIZE", DEFAULT_MAX_BUFFER_SIZE),
            max_buffer_bytes: megabytes(env_or(
                "MINILOG_MAX_BUFFER_MB",
                DEFAULT_MAX_BUFFER_BYTES / (1024 * 1024),
            )),
            flush_interval: env_duration_or("MINILOG_FLUSH_INTERVAL", Duration::from_secs(60)),
            max_points_per_server: env_or("MINILOG_MAX_POINTS", DEFAULT_MAX_POINTS_PER_SERVER),
            persist_interval: env_duration_or("MINILOG_PERSIST_INTERVAL", Duration::from_secs(3600)),
        }
    }
}
