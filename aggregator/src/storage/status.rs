//! Host liveness, derived from time since last contact.
//!
//! There is no heartbeat and no stored transition: every read recomputes the
//! state from `now - last_seen`, so a silent host moves to `timeout` and then
//! `offline` purely by the passage of time.

use crate::storage::series::MetricsStorage;
use chrono::{DateTime, Local};
use minilog_shared::utils::time::format_timestamp;
use minilog_shared::{HostState, ServerStatus};
use std::time::Duration;

/// Silence longer than this is `timeout`
pub const TIMEOUT_AFTER: Duration = Duration::from_secs(60);
/// Silence longer than this is `offline`
pub const OFFLINE_AFTER: Duration = Duration::from_secs(90);

/// Map elapsed silence to a state
pub fn classify(elapsed: Duration) -> HostState {
    if elapsed > OFFLINE_AFTER {
        HostState::Offline
    } else if elapsed > TIMEOUT_AFTER {
        HostState::Timeout
    } else {
        HostState::Online
    }
}

/// State of a host last seen at `last_seen`. A `last_seen` in the future
/// (clock skew) counts as zero elapsed.
pub fn state_since(last_seen: &DateTime<Local>, now: &DateTime<Local>) -> HostState {
    classify((*now - *last_seen).to_std().unwrap_or(Duration::ZERO))
}

impl MetricsStorage {
    /// State of one host; `Unknown` if it never reported.
    pub fn status_of(&self, server: &str, now: &DateTime<Local>) -> HostState {
        self.read_contacts()
            .get(server)
            .map_or(HostState::Unknown, |c| state_since(&c.last_seen, now))
    }

    /// One row per known host, sorted by host name.
    pub fn server_status(&self) -> Vec<ServerStatus> {
        self.server_status_at(&Local::now())
    }

    pub fn server_status_at(&self, now: &DateTime<Local>) -> Vec<ServerStatus> {
        let contacts = self.read_contacts();
        let mut rows: Vec<ServerStatus> = contacts
            .iter()
            .map(|(server, contact)| ServerStatus {
                server: server.clone(),
                status: state_since(&contact.last_seen, now),
                last_seen: format_timestamp(&contact.last_seen),
                latest: Some(contact.latest),
            })
            .collect();
        rows.sort_by(|a, b| a.server.cmp(&b.server));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use minilog_shared::{Metrics, MetricsEntry};

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn seen(storage: &MetricsStorage, server: &str, at: DateTime<Local>) {
        storage.append_at(
            MetricsEntry {
                timestamp: format_timestamp(&at),
                server: server.to_string(),
                metrics: Metrics::new(1.0, 2.0, 3.0, 0.1),
            },
            at,
        );
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(Duration::from_secs(0)), HostState::Online);
        assert_eq!(classify(Duration::from_secs(60)), HostState::Online);
        assert_eq!(classify(Duration::from_secs(61)), HostState::Timeout);
        assert_eq!(classify(Duration::from_secs(90)), HostState::Timeout);
        assert_eq!(classify(Duration::from_secs(91)), HostState::Offline);
    }

    #[test]
    fn test_status_of_at_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MetricsStorage::new(dir.path(), 10);
        seen(&storage, "web1", t0());

        let after = |secs| t0() + chrono::Duration::seconds(secs);
        assert_eq!(storage.status_of("web1", &after(59)), HostState::Online);
        assert_eq!(storage.status_of("web1", &after(61)), HostState::Timeout);
        assert_eq!(storage.status_of("web1", &after(91)), HostState::Offline);
        assert_eq!(storage.status_of("nobody", &after(0)), HostState::Unknown);
    }

    #[test]
    fn test_future_last_seen_is_online() {
        assert_eq!(
            state_since(&(t0() + chrono::Duration::seconds(30)), &t0()),
            HostState::Online
        );
    }

    #[test]
    fn test_server_status_sorted_and_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MetricsStorage::new(dir.path(), 10);
        seen(&storage, "web2", t0());
        seen(&storage, "db1", t0() - chrono::Duration::seconds(70));
        seen(&storage, "app1", t0() - chrono::Duration::seconds(300));

        let rows = storage.server_status_at(&t0());
        let names: Vec<_> = rows.iter().map(|r| r.server.as_str()).collect();
        assert_eq!(names, vec!["app1", "db1", "web2"]);
        assert_eq!(rows[0].status, HostState::Offline);
        assert_eq!(rows[1].status, HostState::Timeout);
        assert_eq!(rows[2].status, HostState::Online);
        assert_eq!(rows[2].last_seen, "2024-05-01 12:00:00");
        assert_eq!(rows[2].latest.unwrap().cpu_percent, 1.0);

        // Same data, later read: everything has aged.
        let later = storage.server_status_at(&(t0() + chrono::Duration::seconds(95)));
        assert!(later.iter().all(|r| r.status == HostState::Offline));
    }

    #[test]
    fn test_new_sample_revives_host() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MetricsStorage::new(dir.path(), 10);
        seen(&storage, "web1", t0());
        let later = t0() + chrono::Duration::seconds(200);
        assert_eq!(storage.status_of("web1", &later), HostState::Offline);

        seen(&storage, "web1", later);
        assert_eq!(storage.status_of("web1", &later), HostState::Online);
    }
}
