//! Shared types and utilities for repopulse
//!
//! This crate contains the record types written to the analytical store, the
//! reference hourly view-delta computation, and small helpers (time, retry)
//! used by both the collector and the warehouse crates.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{records::*, views::*};
