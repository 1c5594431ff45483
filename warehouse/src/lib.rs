//! Warehouse library
//!
//! Batched writes of ingested records into the analytical store, and the
//! hourly view-delta report read back from it.

pub mod audit;
pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod writer;

pub use config::{StoreConfig, TableNames};
pub use error::{QueryError, WriteError};
pub use storage::{BatchStore, RowBatch, Table};
pub use writer::{BatchWriter, FlushSummary};
