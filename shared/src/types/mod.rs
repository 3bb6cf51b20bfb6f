//! Data model shared between the ingestion path and the storage engines

pub mod log;
pub mod metrics;
