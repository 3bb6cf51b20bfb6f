//! Per-host metrics ring store.
//!
//! Each host keeps at most `max_points_per_server` samples in arrival order;
//! once full, every append evicts exactly the oldest sample. Alongside the
//! series, a separately locked contact table records when each host was last
//! heard from, which is all the status calculator needs.

use crate::metrics;
use chrono::{DateTime, Local};
use minilog_shared::{HostState, Metrics, MetricsEntry};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default ring capacity: one hour of samples at a 30s push interval
pub const DEFAULT_MAX_POINTS_PER_SERVER: usize = 120;

/// Last contact with a host
#[derive(Debug, Clone, Copy)]
pub(crate) struct Contact {
    pub(crate) last_seen: DateTime<Local>,
    pub(crate) latest: Metrics,
}

/// Snapshot returned by `MetricsStorage::stats`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsStats {
    pub total_metrics_received: u64,
    /// Hosts whose status is `online` at the time of the call
    pub active_servers: usize,
    pub total_servers: usize,
}

/// Rolling metrics store. Thread-safe.
///
/// Lock order is `series` then `contacts`; readers of the contact table never
/// touch `series`.
#[derive(Debug)]
pub struct MetricsStorage {
    data_dir: PathBuf,
    max_points_per_server: usize,
    series: RwLock<HashMap<String, VecDeque<MetricsEntry>>>,
    contacts: RwLock<HashMap<String, Contact>>,
    total_received: AtomicU64,
}

impl MetricsStorage {
    pub fn new(data_dir: impl Into<PathBuf>, max_points_per_server: usize) -> Self {
        let data_dir = data_dir.into();
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            tracing::warn!("Cannot create data dir {}: {}", data_dir.display(), e);
        }

        Self {
            data_dir,
            max_points_per_server,
            series: RwLock::new(HashMap::new()),
            contacts: RwLock::new(HashMap::new()),
            total_received: AtomicU64::new(0),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub(crate) fn read_series(&self) -> RwLockReadGuard<'_, HashMap<String, VecDeque<MetricsEntry>>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_series(&self) -> RwLockWriteGuard<'_, HashMap<String, VecDeque<MetricsEntry>>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read_contacts(&self) -> RwLockReadGuard<'_, HashMap<String, Contact>> {
        self.contacts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_contacts(&self) -> RwLockWriteGuard<'_, HashMap<String, Contact>> {
        self.contacts.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a sample. Samples without a server name are silently ignored.
    pub fn append(&self, entry: MetricsEntry) {
        self.append_at(entry, Local::now())
    }

    /// `append` with an explicit arrival time, which becomes the host's `last_seen`.
    pub fn append_at(&self, entry: MetricsEntry, now: DateTime<Local>) {
        if entry.server.is_empty() {
            return;
        }

        let mut series = self.write_series();
        let server = entry.server.clone();
        let latest = entry.metrics;

        let points = series
            .entry(server.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.max_points_per_server.min(1024)));
        points.push_back(entry);
        if points.len() > self.max_points_per_server {
            points.pop_front();
        }
        self.total_received.fetch_add(1, Ordering::Relaxed);
        metrics::METRICS_RECEIVED.inc();

        self.write_contacts().insert(
            server,
            Contact {
                last_seen: now,
                latest,
            },
        );
    }

    /// With an empty `server`, the latest sample of every host (sorted by host).
    /// Otherwise up to the last `limit` samples of that host, oldest first.
    ///
    /// `_metric` is accepted for API compatibility; samples always carry all
    /// four readings.
    pub fn query(&self, server: &str, _metric: &str, limit: usize) -> Vec<MetricsEntry> {
        let series = self.read_series();

        if server.is_empty() {
            let mut latest: Vec<MetricsEntry> = series
                .values()
                .filter_map(|points| points.back().cloned())
                .collect();
            latest.sort_by(|a, b| a.server.cmp(&b.server));
            return latest;
        }

        match series.get(server) {
            Some(points) => {
                let skip = points.len().saturating_sub(limit);
                points.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Number of samples currently held for `server`
    #[cfg(test)]
    pub(crate) fn sample_count(&self, server: &str) -> usize {
        self.read_series().get(server).map_or(0, VecDeque::len)
    }

    pub fn stats(&self) -> MetricsStats {
        self.stats_at(&Local::now())
    }

    pub(crate) fn stats_at(&self, now: &DateTime<Local>) -> MetricsStats {
        let contacts = self.read_contacts();
        let active_servers = contacts
            .values()
            .filter(|c| super::status::state_since(&c.last_seen, now) == HostState::Online)
            .count();

        MetricsStats {
            total_metrics_received: self.total_received.load(Ordering::Relaxed),
            active_servers,
            total_servers: contacts.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(server: &str, cpu: f64) -> MetricsEntry {
        MetricsEntry {
            timestamp: "2024-05-01 10:00:00".to_string(),
            server: server.to_string(),
            metrics: Metrics::new(cpu, 50.0, 60.0, 1.0),
        }
    }

    fn store(capacity: usize) -> (tempfile::TempDir, MetricsStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = MetricsStorage::new(dir.path(), capacity);
        (dir, storage)
    }

    #[test]
    fn test_empty_server_is_ignored() {
        let (_dir, storage) = store(10);
        storage.append(sample("", 10.0));
        assert_eq!(storage.stats().total_metrics_received, 0);
        assert_eq!(storage.stats().total_servers, 0);
        assert!(storage.query("", "", 1).is_empty());
    }

    #[test]
    fn test_ring_keeps_most_recent_in_order() {
        let (_dir, storage) = store(120);
        for i in 0..150 {
            storage.append(sample("web1", i as f64));
        }

        assert_eq!(storage.sample_count("web1"), 120);
        let points = storage.query("web1", "cpu", 1000);
        let cpus: Vec<f64> = points.iter().map(|p| p.metrics.cpu_percent).collect();
        let expected: Vec<f64> = (30..150).map(|i| i as f64).collect();
        assert_eq!(cpus, expected);
    }

    #[test]
    fn test_query_limit_returns_tail_oldest_first() {
        let (_dir, storage) = store(10);
        for i in 0..5 {
            storage.append(sample("web1", i as f64));
        }
        let cpus: Vec<f64> = storage
            .query("web1", "", 2)
            .iter()
            .map(|p| p.metrics.cpu_percent)
            .collect();
        assert_eq!(cpus, vec![3.0, 4.0]);
    }

    #[test]
    fn test_query_all_hosts_returns_latest_each() {
        let (_dir, storage) = store(10);
        storage.append(sample("web2", 1.0));
        storage.append(sample("web1", 2.0));
        storage.append(sample("web2", 3.0));

        let latest = storage.query("", "cpu", 120);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].server, "web1");
        assert_eq!(latest[1].server, "web2");
        assert_eq!(latest[1].metrics.cpu_percent, 3.0);
    }

    #[test]
    fn test_unknown_host_query_is_empty() {
        let (_dir, storage) = store(10);
        assert!(storage.query("ghost", "", 10).is_empty());
    }

    #[test]
    fn test_stats_counts_active_hosts_freshly() {
        let (_dir, storage) = store(10);
        let t0 = Local::now();
        storage.append_at(sample("web1", 1.0), t0);
        storage.append_at(sample("web2", 1.0), t0 - chrono::Duration::seconds(120));

        let stats = storage.stats_at(&t0);
        assert_eq!(stats.total_metrics_received, 2);
        assert_eq!(stats.total_servers, 2);
        assert_eq!(stats.active_servers, 1);
    }

    #[test]
    fn test_concurrent_appends_respect_capacity() {
        let (_dir, storage) = store(50);
        let storage = std::sync::Arc::new(storage);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        storage.append(sample("web1", i as f64));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(storage.sample_count("web1"), 50);
        assert_eq!(storage.stats().total_metrics_received, 400);
    }
}
