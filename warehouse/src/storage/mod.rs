//! Storage backends

#[cfg(feature = "clickhouse-storage")]
pub mod clickhouse;
pub mod memory;

use async_trait::async_trait;
use repopulse_shared::types::records::{
    AuthorCommitRecord, LanguagePositionRecord, RepositoryRecord,
};
use repopulse_shared::types::views::PhraseViewDeltas;

use crate::error::{QueryError, WriteError};

/// Logical tables written by an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Repositories,
    AuthorCommits,
    LanguagePositions,
}

impl Table {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Repositories => "repositories",
            Table::AuthorCommits => "author_commits",
            Table::LanguagePositions => "language_positions",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All rows destined for one table in one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RowBatch {
    Repositories(Vec<RepositoryRecord>),
    AuthorCommits(Vec<AuthorCommitRecord>),
    LanguagePositions(Vec<LanguagePositionRecord>),
}

impl RowBatch {
    pub fn table(&self) -> Table {
        match self {
            RowBatch::Repositories(_) => Table::Repositories,
            RowBatch::AuthorCommits(_) => Table::AuthorCommits,
            RowBatch::LanguagePositions(_) => Table::LanguagePositions,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowBatch::Repositories(rows) => rows.len(),
            RowBatch::AuthorCommits(rows) => rows.len(),
            RowBatch::LanguagePositions(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-oriented analytical store.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Insert every row of `batch` as one bulk operation. Either all rows are
    /// accepted or the call fails.
    async fn insert(&self, batch: &RowBatch) -> Result<(), WriteError>;

    /// Hourly view-delta report for `campaign_id` over the current day.
    async fn view_deltas(&self, campaign_id: i64) -> Result<Vec<PhraseViewDeltas>, QueryError>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}
