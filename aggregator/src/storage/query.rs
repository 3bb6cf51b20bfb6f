//! Tiered log queries: memory buffer first, then the current hour's chunk file.
//!
//! Only the current hour is read from disk; older hourly files are never
//! consulted even when `limit` is not met.

use crate::metrics;
use crate::storage::chunk;
use crate::storage::logs::LogStorage;
use chrono::{DateTime, Local};
use minilog_shared::LogEntry;

/// Case-insensitive filter over keyword, server and level. Empty values match
/// everything; the three dimensions are AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    keyword: String,
    server: String,
    level: String,
}

impl LogFilter {
    pub fn new(keyword: &str, server: &str, level: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            server: server.to_lowercase(),
            level: level.to_lowercase(),
        }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        let level = entry.level.to_lowercase();
        let server = entry.server.to_lowercase();

        if !self.keyword.is_empty()
            && !entry.message.to_lowercase().contains(&self.keyword)
            && !level.contains(&self.keyword)
            && !server.contains(&self.keyword)
        {
            return false;
        }
        if !self.server.is_empty() && server != self.server {
            return false;
        }
        if !self.level.is_empty() && level != self.level {
            return false;
        }
        true
    }
}

impl LogStorage {
    /// Up to `limit` matching entries, newest first.
    ///
    /// Unreadable files and undecodable chunks contribute nothing; the query
    /// returns whatever the other sources produced.
    pub fn query(&self, keyword: &str, server: &str, level: &str, limit: usize) -> Vec<LogEntry> {
        self.query_at(&LogFilter::new(keyword, server, level), limit, &Local::now())
    }

    pub(crate) fn query_at(&self, filter: &LogFilter, limit: usize, now: &DateTime<Local>) -> Vec<LogEntry> {
        let mut results: Vec<LogEntry> = {
            let buffer = self.read_buffer();
            buffer
                .entries
                .iter()
                .rev()
                .filter(|e| filter.matches(e))
                .take(limit)
                .cloned()
                .collect()
        };

        if results.len() < limit {
            let remaining = limit - results.len();
            results.extend(self.query_disk(filter, remaining, now));
        }
        results
    }

    /// Scan the chunk file of the hour containing `now`. Chunks are visited
    /// in file order and each chunk's lines newest first.
    fn query_disk(&self, filter: &LogFilter, limit: usize, now: &DateTime<Local>) -> Vec<LogEntry> {
        let path = self.chunk_path(now);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Cannot read {}: {}", path.display(), e);
                }
                return Vec::new();
            }
        };
        metrics::DISK_QUERIES.inc();

        let mut results = Vec::new();
        for block in chunk::split_chunks(&data) {
            for entry in chunk::decode(block).into_iter().rev() {
                if results.len() >= limit {
                    return results;
                }
                if filter.matches(&entry) {
                    results.push(entry);
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 13, 20, 0).unwrap()
    }

    fn log(level: &str, server: &str, message: &str) -> LogEntry {
        LogEntry::new("2024-05-01 13:00:00", level, server, message)
    }

    #[test]
    fn test_filter_empty_matches_all() {
        let filter = LogFilter::default();
        assert!(filter.matches(&log("INFO", "web1", "hello")));
        assert!(filter.matches(&LogEntry::default()));
    }

    #[test]
    fn test_filter_keyword_searches_message_level_server() {
        let filter = LogFilter::new("ERR", "", "");
        assert!(filter.matches(&log("error", "web1", "boom")));
        assert!(filter.matches(&log("INFO", "err-proxy", "ok")));
        assert!(filter.matches(&log("INFO", "web1", "stderr closed")));
        assert!(!filter.matches(&log("INFO", "web1", "fine")));
    }

    #[test]
    fn test_filter_server_and_level_are_exact() {
        let filter = LogFilter::new("", "WEB1", "warn");
        assert!(filter.matches(&log("WARN", "web1", "x")));
        assert!(!filter.matches(&log("WARN", "web10", "x")));
        assert!(!filter.matches(&log("WARNING", "web1", "x")));
    }

    #[test]
    fn test_filter_dimensions_are_and_combined() {
        let filter = LogFilter::new("timeout", "db1", "error");
        assert!(filter.matches(&log("ERROR", "db1", "query timeout")));
        assert!(!filter.matches(&log("ERROR", "db2", "query timeout")));
        assert!(!filter.matches(&log("WARN", "db1", "query timeout")));
        assert!(!filter.matches(&log("ERROR", "db1", "query ok")));
    }

    #[test]
    fn test_memory_results_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        for i in 0..5 {
            storage.append(log("INFO", "web1", &format!("m{}", i)));
        }

        let results = storage.query_at(&LogFilter::default(), 3, &now());
        let messages: Vec<_> = results.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["m4", "m3", "m2"]);
    }

    #[test]
    fn test_falls_back_to_current_hour_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        storage.append(log("INFO", "web1", "old-a"));
        storage.append(log("ERROR", "web1", "old-b"));
        storage.compact_at(&now()).unwrap();
        storage.append(log("INFO", "web1", "fresh"));

        let results = storage.query_at(&LogFilter::default(), 10, &now());
        let messages: Vec<_> = results.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["fresh", "old-b", "old-a"]);
    }

    #[test]
    fn test_disk_limit_cuts_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        for batch in [["a", "b"], ["c", "d"]] {
            for message in batch {
                storage.append(log("INFO", "web1", message));
            }
            storage.compact_at(&now()).unwrap();
        }

        // chunks in file order, lines within a chunk newest first
        let results = storage.query_at(&LogFilter::default(), 3, &now());
        let messages: Vec<_> = results.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "a", "d"]);
    }

    #[test]
    fn test_disk_not_read_when_memory_fills_limit() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        storage.append(log("INFO", "web1", "on-disk"));
        storage.compact_at(&now()).unwrap();
        storage.append(log("INFO", "web1", "in-memory"));

        let results = storage.query_at(&LogFilter::default(), 1, &now());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "in-memory");
    }

    #[test]
    fn test_previous_hour_is_not_searched() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        let previous_hour = Local.with_ymd_and_hms(2024, 5, 1, 12, 59, 0).unwrap();
        storage.append(log("INFO", "web1", "last hour"));
        storage.compact_at(&previous_hour).unwrap();

        assert!(storage.query_at(&LogFilter::default(), 10, &now()).is_empty());
    }

    #[test]
    fn test_server_filter_applies_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        storage.append(log("INFO", "web1", "a"));
        storage.append(log("INFO", "Web2", "b"));
        storage.append(log("INFO", "web1", "c"));
        storage.compact_at(&now()).unwrap();

        let results = storage.query_at(&LogFilter::new("", "web2", ""), 10, &now());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].server, "Web2");
    }

    #[test]
    fn test_corrupt_chunk_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        storage.append(log("INFO", "web1", "good"));
        let summary = storage.compact_at(&now()).unwrap();

        let mut garbage = chunk::separator(1).into_bytes();
        garbage.extend_from_slice(b"not lz4 at all");
        let mut data = std::fs::read(&summary.path).unwrap();
        data.extend_from_slice(&garbage);
        std::fs::write(&summary.path, data).unwrap();

        let results = storage.query_at(&LogFilter::default(), 10, &now());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "good");
    }

    #[test]
    fn test_missing_file_returns_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogStorage::new(dir.path(), 1000);
        storage.append(log("INFO", "web1", "only"));
        assert_eq!(storage.query_at(&LogFilter::default(), 10, &now()).len(), 1);
    }
}
