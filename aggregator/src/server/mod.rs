//! HTTP surface of the aggregator: ingestion and query API plus admin endpoints.

pub mod api;
pub mod http;

use crate::storage::{LogStorage, MetricsStorage};
use minilog_shared::LogEntry;
use std::sync::Arc;

/// Engines shared by every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub logs: Arc<LogStorage>,
    pub metrics: Arc<MetricsStorage>,
}

impl AppState {
    pub fn new(logs: Arc<LogStorage>, metrics: Arc<MetricsStorage>) -> Self {
        Self { logs, metrics }
    }

    /// Route one ingested entry: always to the log buffer, and to the metrics
    /// store when it carries a snapshot and names its server.
    pub fn ingest(&self, entry: LogEntry) {
        if let Some(sample) = entry.metrics_entry() {
            self.metrics.append(sample);
        }
        self.logs.append(entry);
    }
}
