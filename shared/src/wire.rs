//! Ingestion payload parsing.
//!
//! Agents push a JSON `LogEntry`. Ingestion never rejects input: a body that
//! does not parse is kept verbatim as the message of a fresh entry, and a
//! missing or malformed timestamp is replaced by the arrival time.

use crate::types::log::LogEntry;
use crate::utils::time::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Local};

/// Turn a raw request body into a `LogEntry`, stamped with `now` where needed.
pub fn parse_log_entry(body: &[u8], now: &DateTime<Local>) -> LogEntry {
    let mut entry = serde_json::from_slice::<LogEntry>(body).unwrap_or_else(|_| LogEntry {
        message: String::from_utf8_lossy(body).into_owned(),
        ..LogEntry::default()
    });

    if parse_timestamp(&entry.timestamp).is_none() {
        entry.timestamp = format_timestamp(now);
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_parses_full_entry() {
        let body = br#"{"timestamp":"2024-05-01 09:00:00","level":"WARN","server":"db1","message":"slow query","metrics":{"cpu_percent":91.5,"memory_percent":40,"disk_percent":70,"load_avg":3.2}}"#;
        let entry = parse_log_entry(body, &fixed_now());
        assert_eq!(entry.timestamp, "2024-05-01 09:00:00");
        assert_eq!(entry.level, "WARN");
        assert_eq!(entry.server, "db1");
        assert_eq!(entry.metrics.unwrap().cpu_percent, 91.5);
    }

    #[test]
    fn test_malformed_body_kept_as_message() {
        let entry = parse_log_entry(b"plain text, not json", &fixed_now());
        assert_eq!(entry.message, "plain text, not json");
        assert_eq!(entry.timestamp, "2024-05-01 09:30:00");
        assert!(entry.level.is_empty());
        assert!(entry.server.is_empty());
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let entry = parse_log_entry(br#"{"level":"INFO","message":"hi"}"#, &fixed_now());
        assert_eq!(entry.timestamp, "2024-05-01 09:30:00");
        assert_eq!(entry.message, "hi");
    }

    #[test]
    fn test_unparsable_timestamp_defaults_to_now() {
        let entry = parse_log_entry(br#"{"timestamp":"last tuesday","message":"hi"}"#, &fixed_now());
        assert_eq!(entry.timestamp, "2024-05-01 09:30:00");
    }
}
