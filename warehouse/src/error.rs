//! Store error types

use repopulse_shared::utils::retry::Retryable;
use thiserror::Error;

/// A bulk insert failed. The whole batch is retried; rows are never
/// partially acknowledged.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("insert into {table} failed: {message}")]
    Insert { table: String, message: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

impl WriteError {
    pub fn insert(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Insert {
            table: table.into(),
            message: message.into(),
        }
    }
}

impl Retryable for WriteError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// A read-only report query failed.
#[derive(Debug, Error)]
#[error("query on {table} failed: {message}")]
pub struct QueryError {
    pub table: String,
    pub message: String,
}
