//! Log buffer and compactor.
//!
//! Entries are appended to an in-memory buffer and drained into a compressed
//! chunk of the current hour's file either when the buffer reaches
//! `max_buffer_size` entries or when the compaction timer fires. The drain
//! swaps the buffer out under the write lock; encoding, compression and the
//! file append all happen after the lock is released, so ingestion is never
//! blocked on disk.

use crate::metrics;
use crate::storage::chunk;
use chrono::{DateTime, Local};
use minilog_shared::utils::time::hour_shard;
use minilog_shared::LogEntry;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default entry-count threshold for an early compaction
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1000;
/// Default byte size above which the buffer is reported as oversized
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Default)]
pub(crate) struct LogBuffer {
    pub(crate) entries: Vec<LogEntry>,
    /// Approximate rendered size of `entries`
    bytes: usize,
    /// Set once `bytes` crossed the configured limit; cleared on drain
    over_budget: bool,
}

/// Outcome of one compaction that drained a non-empty buffer.
#[derive(Debug, Clone)]
pub struct CompactionSummary {
    pub entries: usize,
    pub plain_bytes: usize,
    pub compressed_bytes: usize,
    pub ratio: f64,
    pub path: PathBuf,
    /// False when the append to `path` failed. Counters are updated either way.
    pub written: bool,
}

/// Snapshot returned by `LogStorage::stats`
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total_received: u64,
    pub total_compressed: u64,
    pub in_memory: usize,
    /// Ratio of the most recent compaction, formatted `R.R:1`
    pub compression_ratio: String,
    /// Distinct hosts currently present in the memory buffer
    pub servers: Vec<String>,
}

/// Memory-first log store with hourly LZ4 chunk files. Thread-safe.
#[derive(Debug)]
pub struct LogStorage {
    data_dir: PathBuf,
    max_buffer_size: usize,
    max_buffer_bytes: usize,
    pub(crate) buffer: RwLock<LogBuffer>,
    total_received: AtomicU64,
    total_compressed: AtomicU64,
    chunks_written: AtomicU64,
    last_ratio: Mutex<f64>,
    /// Wakes the compaction task early when the entry threshold is reached.
    flush_notify: Notify,
}

impl LogStorage {
    /// Create a store writing chunks under `data_dir`. The directory is created
    /// if missing; failure to do so only surfaces later as failed writes.
    pub fn new(data_dir: impl Into<PathBuf>, max_buffer_size: usize) -> Self {
        let data_dir = data_dir.into();
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            warn!("Cannot create data dir {}: {}", data_dir.display(), e);
        }

        Self {
            data_dir,
            max_buffer_size: max_buffer_size.max(1),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            buffer: RwLock::new(LogBuffer {
                entries: Vec::with_capacity(max_buffer_size.min(4096)),
                ..LogBuffer::default()
            }),
            total_received: AtomicU64::new(0),
            total_compressed: AtomicU64::new(0),
            chunks_written: AtomicU64::new(0),
            last_ratio: Mutex::new(0.0),
            flush_notify: Notify::new(),
        }
    }

    /// Override the byte size at which the buffer is reported as oversized.
    pub fn with_max_buffer_bytes(mut self, max_buffer_bytes: usize) -> Self {
        self.max_buffer_bytes = max_buffer_bytes;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub(crate) fn read_buffer(&self) -> RwLockReadGuard<'_, LogBuffer> {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_buffer(&self) -> RwLockWriteGuard<'_, LogBuffer> {
        self.buffer.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer an entry. Never blocks on compaction; when the entry threshold is
    /// reached the background compactor is woken instead.
    pub fn append(&self, entry: LogEntry) {
        let entry_bytes = approx_size(&entry);
        let (len, bytes, crossed) = {
            let mut buffer = self.write_buffer();
            buffer.entries.push(entry);
            buffer.bytes += entry_bytes;
            self.total_received.fetch_add(1, Ordering::Relaxed);

            let crossed = !buffer.over_budget && buffer.bytes >= self.max_buffer_bytes;
            if crossed {
                buffer.over_budget = true;
            }
            (buffer.entries.len(), buffer.bytes, crossed)
        };

        metrics::LOGS_RECEIVED.inc();
        metrics::BUFFER_ENTRIES.set(len as f64);
        metrics::BUFFER_BYTES.set(bytes as f64);

        if crossed {
            warn!(
                "Log buffer holds ~{} bytes ({} entries), above the {} byte budget; waiting for the next compaction",
                bytes, len, self.max_buffer_bytes
            );
        }
        if len >= self.max_buffer_size {
            self.flush_notify.notify_one();
        }
    }

    /// Drain the buffer into one chunk appended to the current hour's file.
    ///
    /// Returns `None` when the buffer was already empty, which is what a
    /// concurrent caller that lost the swap observes.
    pub fn compact(&self) -> Option<CompactionSummary> {
        self.compact_at(&Local::now())
    }

    pub(crate) fn compact_at(&self, now: &DateTime<Local>) -> Option<CompactionSummary> {
        let batch = {
            let mut buffer = self.write_buffer();
            if buffer.entries.is_empty() {
                return None;
            }
            buffer.bytes = 0;
            buffer.over_budget = false;
            std::mem::take(&mut buffer.entries)
        };
        metrics::BUFFER_ENTRIES.set(0.0);
        metrics::BUFFER_BYTES.set(0.0);

        let start = Instant::now();
        let count = batch.len();
        let encoded = match chunk::encode(&batch) {
            Ok(encoded) => encoded,
            Err(e) => {
                metrics::COMPACTIONS.with_label_values(&["error"]).inc();
                warn!("Failed to encode {} log entries, batch dropped: {}", count, e);
                return None;
            }
        };

        let path = self.chunk_path(now);
        let written = match append_chunk(&path, &chunk::separator(now.timestamp()), &encoded.compressed) {
            Ok(()) => {
                metrics::COMPACTIONS.with_label_values(&["ok"]).inc();
                true
            }
            Err(e) => {
                metrics::COMPACTIONS.with_label_values(&["error"]).inc();
                warn!("Failed to append chunk to {}: {}", path.display(), e);
                false
            }
        };

        let ratio = encoded.ratio();
        let count = encoded.entries;
        self.total_compressed.fetch_add(count as u64, Ordering::Relaxed);
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
        *self.last_ratio.lock().unwrap_or_else(PoisonError::into_inner) = ratio;
        metrics::COMPACTED_ENTRIES.inc_by(count as f64);
        metrics::COMPACTION_DURATION.observe(start.elapsed().as_secs_f64());

        info!(
            "Compacted {} logs | {} B -> {} B | ratio {:.1}:1 | file {}",
            count,
            encoded.plain_len,
            encoded.compressed.len(),
            ratio,
            path.display()
        );

        Some(CompactionSummary {
            entries: count,
            plain_bytes: encoded.plain_len,
            compressed_bytes: encoded.compressed.len(),
            ratio,
            path,
            written,
        })
    }

    /// Chunk file for the hour containing `at`, e.g. `logs-2024-05-01-13.lz4`.
    pub fn chunk_path(&self, at: &DateTime<Local>) -> PathBuf {
        self.data_dir.join(format!("logs-{}.lz4", hour_shard(at)))
    }

    /// Number of compactions that produced a chunk
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> LogStats {
        let buffer = self.read_buffer();
        let servers: BTreeSet<&str> = buffer
            .entries
            .iter()
            .filter(|e| !e.server.is_empty())
            .map(|e| e.server.as_str())
            .collect();
        let ratio = *self.last_ratio.lock().unwrap_or_else(PoisonError::into_inner);

        LogStats {
            total_received: self.total_received.load(Ordering::Relaxed),
            total_compressed: self.total_compressed.load(Ordering::Relaxed),
            in_memory: buffer.entries.len(),
            compression_ratio: format!("{:.1}:1", ratio),
            servers: servers.into_iter().map(str::to_string).collect(),
        }
    }

    /// Spawn the background compactor. It compacts every `period`, early when
    /// the entry threshold is reached, and once more when `cancel` fires.
    pub fn spawn_compactor(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let storage = Arc::clone(self);
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        compact_in_background(&storage, "Timer compaction").await;
                    }
                    _ = storage.flush_notify.notified() => {
                        compact_in_background(&storage, "Threshold compaction").await;
                    }
                    _ = cancel.cancelled() => {
                        compact_in_background(&storage, "Shutdown compaction").await;
                        break;
                    }
                }
            }
        })
    }
}

/// Run one compaction on the blocking pool so file I/O stays off the runtime.
async fn compact_in_background(storage: &Arc<LogStorage>, label: &str) {
    let storage = Arc::clone(storage);
    match tokio::task::spawn_blocking(move || storage.compact()).await {
        Ok(Some(summary)) => debug!("{}: {} entries", label, summary.entries),
        Ok(None) => {}
        Err(e) => warn!("{} task failed: {}", label, e),
    }
}

/// Append header and block with a single write so concurrent compactions
/// cannot interleave inside a chunk.
fn append_chunk(path: &Path, separator: &str, block: &[u8]) -> std::io::Result<()> {
    let mut framed = Vec::with_capacity(separator.len() + block.len());
    framed.extend_from_slice(separator.as_bytes());
    framed.extend_from_slice(block);

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&framed)
}

fn approx_size(entry: &LogEntry) -> usize {
    // brackets, spaces and newline of the rendered line
    entry.timestamp.len() + entry.level.len() + entry.server.len() + entry.message.len() + 10
}
