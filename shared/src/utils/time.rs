//! Time-related utilities
//!
//! All wall-clock values are local time. Log timestamps use a fixed
//! second-resolution layout and data files are sharded by calendar hour.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Layout of `LogEntry::timestamp` and `ServerStatus::last_seen`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layout of the hour component in data file names
pub const HOUR_FORMAT: &str = "%Y-%m-%d-%H";

/// Format a wall-clock time in the log timestamp layout
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a log timestamp back into local time.
///
/// Returns `None` for anything not in `TIMESTAMP_FORMAT`, and for local times
/// that do not exist (DST gaps).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// Hour shard key, e.g. `2024-05-01-13`
pub fn hour_shard(time: &DateTime<Local>) -> String {
    time.format(HOUR_FORMAT).to_string()
}
