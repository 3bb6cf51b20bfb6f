//! Prometheus metrics for the aggregator service

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

// ── Ingestion metrics ────────────────────────────────────────────────────────

pub static LOGS_RECEIVED: Lazy<Counter> = Lazy::new(|| {
    register_counter!("minilog_logs_received_total", "Log entries accepted for buffering").unwrap()
});

pub static METRICS_RECEIVED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "minilog_metrics_samples_total",
        "Metrics samples stored in the ring store"
    )
    .unwrap()
});

// ── Buffer metrics ───────────────────────────────────────────────────────────

pub static BUFFER_ENTRIES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "minilog_buffer_entries",
        "Log entries waiting in memory for compaction"
    )
    .unwrap()
});

pub static BUFFER_BYTES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "minilog_buffer_bytes",
        "Approximate plaintext size of the in-memory log buffer"
    )
    .unwrap()
});

// ── Compaction metrics ───────────────────────────────────────────────────────

pub static COMPACTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "minilog_compactions_total",
        "Chunk compactions by outcome of the disk write",
        &["status"]
    )
    .unwrap()
});

pub static COMPACTED_ENTRIES: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "minilog_compacted_entries_total",
        "Log entries drained from memory into chunks"
    )
    .unwrap()
});

pub static COMPACTION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "minilog_compaction_duration_seconds",
        "Encode, compress and append latency",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

// ── Query & persistence metrics ──────────────────────────────────────────────

pub static DISK_QUERIES: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "minilog_disk_queries_total",
        "Log queries that fell back to the current hour's chunk file"
    )
    .unwrap()
});

pub static PERSIST_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "minilog_metrics_persist_total",
        "Hourly metrics aggregate writes",
        &["status"]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Failed to encode Prometheus metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
