//! Log and metrics aggregation service library

pub mod config;
pub mod metrics;
pub mod server;
pub mod storage;
