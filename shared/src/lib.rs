//! Shared types and utilities for MiniLog
//!
//! This crate contains the data model pushed by agents and served by the
//! aggregator, plus the timestamp and ingestion helpers both sides agree on.

pub mod types;
pub mod utils;
pub mod wire;

// Re-export commonly used types
pub use types::{log::*, metrics::*};
