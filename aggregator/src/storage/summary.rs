//! On-demand metrics summaries and hourly aggregate persistence.

use crate::metrics;
use crate::storage::series::MetricsStorage;
use chrono::{DateTime, Local};
use minilog_shared::utils::time::hour_shard;
use minilog_shared::{Metrics, MetricsEntry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Mean of every reading over a host's window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub load: f64,
}

/// Extremes are only tracked for cpu and memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricExtremes {
    pub cpu: f64,
    pub memory: f64,
}

/// Summary of a host's current ring-store window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub server: String,
    pub latest: Metrics,
    pub avg: MetricAverages,
    pub max: MetricExtremes,
    pub min: MetricExtremes,
    pub samples: usize,
}

/// One host's entry in `metrics-<hour>.json`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub avg_cpu: f64,
    pub avg_memory: f64,
    pub avg_disk: f64,
    pub avg_load: f64,
    pub samples: usize,
}

fn summarize(server: &str, points: &VecDeque<MetricsEntry>) -> Option<MetricsSummary> {
    let first = points.front()?.metrics;
    let latest = points.back()?.metrics;

    let mut sum = Metrics::default();
    let mut max = MetricExtremes {
        cpu: first.cpu_percent,
        memory: first.memory_percent,
    };
    let mut min = max;

    for point in points {
        let m = &point.metrics;
        sum.cpu_percent += m.cpu_percent;
        sum.memory_percent += m.memory_percent;
        sum.disk_percent += m.disk_percent;
        sum.load_avg += m.load_avg;

        max.cpu = max.cpu.max(m.cpu_percent);
        max.memory = max.memory.max(m.memory_percent);
        min.cpu = min.cpu.min(m.cpu_percent);
        min.memory = min.memory.min(m.memory_percent);
    }

    let count = points.len() as f64;
    Some(MetricsSummary {
        server: server.to_string(),
        latest,
        avg: MetricAverages {
            cpu: sum.cpu_percent / count,
            memory: sum.memory_percent / count,
            disk: sum.disk_percent / count,
            load: sum.load_avg / count,
        },
        max,
        min,
        samples: points.len(),
    })
}

impl MetricsStorage {
    /// Summary of `server`'s window, or `None` if it holds no samples.
    pub fn aggregated_stats(&self, server: &str) -> Option<MetricsSummary> {
        let series = self.read_series();
        summarize(server, series.get(server)?)
    }

    /// Summaries of every host with samples, sorted by host name.
    pub fn summaries(&self) -> Vec<MetricsSummary> {
        let series = self.read_series();
        let mut summaries: Vec<MetricsSummary> = series
            .iter()
            .filter_map(|(server, points)| summarize(server, points))
            .collect();
        summaries.sort_by(|a, b| a.server.cmp(&b.server));
        summaries
    }

    /// Per-host means of the current windows. Hosts without samples are absent.
    pub fn hourly_aggregates(&self) -> BTreeMap<String, HourlyAggregate> {
        let series = self.read_series();
        series
            .iter()
            .filter_map(|(server, points)| {
                let s = summarize(server, points)?;
                Some((
                    server.clone(),
                    HourlyAggregate {
                        avg_cpu: s.avg.cpu,
                        avg_memory: s.avg.memory,
                        avg_disk: s.avg.disk,
                        avg_load: s.avg.load,
                        samples: s.samples,
                    },
                ))
            })
            .collect()
    }

    /// Write `metrics-<hour>.json` for the current hour.
    ///
    /// Best effort: returns the path when a file was written, `None` when there
    /// was nothing to write or the write failed.
    pub fn persist_hourly(&self) -> Option<PathBuf> {
        self.persist_hourly_at(&Local::now())
    }

    pub(crate) fn persist_hourly_at(&self, now: &DateTime<Local>) -> Option<PathBuf> {
        let aggregates = self.hourly_aggregates();
        if aggregates.is_empty() {
            return None;
        }

        let path = self
            .data_dir()
            .join(format!("metrics-{}.json", hour_shard(now)));
        let written = serde_json::to_vec_pretty(&aggregates)
            .map_err(std::io::Error::from)
            .and_then(|json| std::fs::write(&path, json));

        match written {
            Ok(()) => {
                metrics::PERSIST_TOTAL.with_label_values(&["ok"]).inc();
                tracing::info!("Persisted metrics for {} hosts to {}", aggregates.len(), path.display());
                Some(path)
            }
            Err(e) => {
                metrics::PERSIST_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!("Failed to persist metrics to {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Spawn the hourly persistence loop. The first write happens one `period`
    /// after start; the loop exits when `cancel` fires.
    pub fn spawn_persister(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let storage = Arc::clone(self);
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let storage = Arc::clone(&storage);
                        if let Err(e) = tokio::task::spawn_blocking(move || storage.persist_hourly()).await {
                            tracing::warn!("Metrics persist task failed: {}", e);
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}
