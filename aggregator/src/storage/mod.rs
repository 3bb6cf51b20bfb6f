//! Storage engines
//!
//! * [`logs::LogStorage`]: memory buffer, compaction into hourly LZ4 chunk
//!   files, and tiered queries ([`query`]).
//! * [`series::MetricsStorage`]: per-host ring store, liveness ([`status`]) and
//!   summaries ([`summary`]).

pub mod chunk;
pub mod logs;
pub mod query;
pub mod series;
pub mod status;
pub mod summary;

pub use logs::{CompactionSummary, LogStats, LogStorage};
pub use query::LogFilter;
pub use series::{MetricsStats, MetricsStorage};
pub use summary::{HourlyAggregate, MetricsSummary};
