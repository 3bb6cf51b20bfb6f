//! MiniLog aggregator
//!
//! Receives log lines and metrics samples from agents over HTTP, buffers logs
//! in memory and compacts them into hourly LZ4 chunk files, and keeps a rolling
//! metrics window per host with hourly aggregate snapshots.

use anyhow::{Context, Result};
use minilog_aggregator::{
    config::AggregatorConfig,
    server::{http, AppState},
    storage::{LogStorage, MetricsStorage},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AggregatorConfig::default();
    info!(
        "Starting MiniLog aggregator on {} (data dir {}, compaction at {} logs or every {:?})",
        config.listen_addr,
        config.data_dir.display(),
        config.max_buffer_size,
        config.flush_interval
    );

    let logs = Arc::new(
        LogStorage::new(&config.data_dir, config.max_buffer_size)
            .with_max_buffer_bytes(config.max_buffer_bytes),
    );
    let metrics = Arc::new(MetricsStorage::new(&config.data_dir, config.max_points_per_server));

    let cancel = CancellationToken::new();
    let compactor = logs.spawn_compactor(config.flush_interval, cancel.clone());
    let persister = metrics.spawn_persister(config.persist_interval, cancel.clone());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Invalid listen address")?;
    let state = AppState::new(logs, metrics);

    let served = tokio::select! {
        res = http::serve(addr, state) => res.context("HTTP server error"),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    cancel.cancel();
    for (name, task) in [("Compactor", compactor), ("Metrics persister", persister)] {
        if let Err(e) = task.await {
            warn!("{} task failed: {}", name, e);
        }
    }
    served
}
