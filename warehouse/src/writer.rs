//! Batch writer
//!
//! Rows are staged in memory for the whole collection phase and written with
//! one bulk insert per table at the end of the run.

use repopulse_shared::types::records::{
    AuthorCommitRecord, LanguagePositionRecord, RepositoryRecord,
};
use repopulse_shared::utils::retry::{retry_with_backoff, RetryPolicy};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::audit;
use crate::error::WriteError;
use crate::metrics;
use crate::storage::{BatchStore, RowBatch};

/// Rows written per table by [`BatchWriter::flush_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub repositories: usize,
    pub language_positions: usize,
    pub author_commits: usize,
}

impl FlushSummary {
    pub fn total(&self) -> usize {
        self.repositories + self.language_positions + self.author_commits
    }
}

pub struct BatchWriter {
    store: Arc<dyn BatchStore>,
    retry: RetryPolicy,
    repositories: Vec<RepositoryRecord>,
    author_commits: Vec<AuthorCommitRecord>,
    positions: Vec<LanguagePositionRecord>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn BatchStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            repositories: Vec::new(),
            author_commits: Vec::new(),
            positions: Vec::new(),
        }
    }

    pub fn stage_repositories(&mut self, rows: impl IntoIterator<Item = RepositoryRecord>) {
        self.repositories.extend(rows);
        self.update_pending_gauge();
    }

    pub fn stage_author_commits(&mut self, rows: impl IntoIterator<Item = AuthorCommitRecord>) {
        self.author_commits.extend(rows);
        self.update_pending_gauge();
    }

    pub fn stage_positions(&mut self, rows: impl IntoIterator<Item = LanguagePositionRecord>) {
        self.positions.extend(rows);
        self.update_pending_gauge();
    }

    /// Number of rows staged and not yet flushed.
    pub fn pending_rows(&self) -> usize {
        self.repositories.len() + self.author_commits.len() + self.positions.len()
    }

    fn update_pending_gauge(&self) {
        metrics::PENDING_ROWS.set(self.pending_rows() as f64);
    }

    /// Write one table's rows as a single bulk insert, retrying the whole
    /// batch on failure. An empty batch never reaches the store.
    pub async fn flush(&self, batch: &RowBatch) -> Result<usize, WriteError> {
        if batch.is_empty() {
            debug!("Nothing to flush for {}", batch.table());
            return Ok(0);
        }

        let table = batch.table();
        let count = batch.len();
        let start = Instant::now();
        let operation = format!("flush {} ({} rows)", table, count);
        let store = &self.store;

        let result = retry_with_backoff(&operation, self.retry, || store.insert(batch)).await;

        metrics::FLUSH_DURATION
            .with_label_values(&[table.as_str()])
            .observe(start.elapsed().as_secs_f64());
        match result {
            Ok(()) => {
                metrics::FLUSH_TOTAL
                    .with_label_values(&[table.as_str(), "ok"])
                    .inc();
                metrics::FLUSH_ROWS
                    .with_label_values(&[table.as_str()])
                    .inc_by(count as f64);
                audit::table_flushed(table.as_str(), count);
                info!(
                    "Flushed {} rows to {} ({})",
                    count,
                    table,
                    self.store.backend()
                );
                Ok(count)
            }
            Err(e) => {
                metrics::FLUSH_TOTAL
                    .with_label_values(&[table.as_str(), "error"])
                    .inc();
                Err(e)
            }
        }
    }

    /// Flush every staged table once.
    ///
    /// Order: repositories first (replace-on-merge makes a re-run harmless),
    /// then language positions, then author commits. The first table that
    /// still fails after retries stops the flush; tables flushed before it
    /// stay written, since the store has no multi-table transaction. Staged
    /// rows are consumed either way.
    pub async fn flush_all(&mut self) -> Result<FlushSummary, WriteError> {
        let repositories = RowBatch::Repositories(std::mem::take(&mut self.repositories));
        let positions = RowBatch::LanguagePositions(std::mem::take(&mut self.positions));
        let author_commits = RowBatch::AuthorCommits(std::mem::take(&mut self.author_commits));
        self.update_pending_gauge();

        Ok(FlushSummary {
            repositories: self.flush(&repositories).await?,
            language_positions: self.flush(&positions).await?,
            author_commits: self.flush(&author_commits).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::Table;
    use chrono::Utc;
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_wait_hint: Duration::from_secs(1),
        }
    }

    fn repo(name: &str) -> RepositoryRecord {
        RepositoryRecord {
            name: name.to_string(),
            owner: "octo".to_string(),
            stars: 10,
            watchers: 10,
            forks: 1,
            language: "Go".to_string(),
            updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_empty_flush_does_not_touch_store() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BatchWriter::new(store.clone(), fast_retry(3));

        let written = writer.flush(&RowBatch::AuthorCommits(vec![])).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_flush_all_writes_each_table_once() {
        let store = Arc::new(InMemoryStore::new());
        let mut writer = BatchWriter::new(store.clone(), fast_retry(3));
        writer.stage_repositories(vec![repo("a"), repo("b")]);
        writer.stage_positions(vec![LanguagePositionRecord {
            repository: "a".to_string(),
            position: 1,
            language: "Go".to_string(),
        }]);
        writer.stage_author_commits(vec![
            AuthorCommitRecord {
                repository: "a".to_string(),
                author: "Ann".to_string(),
                commits: 2,
            },
            AuthorCommitRecord {
                repository: "b".to_string(),
                author: "Ben".to_string(),
                commits: 1,
            },
        ]);
        assert_eq!(writer.pending_rows(), 5);

        let summary = writer.flush_all().await.unwrap();
        assert_eq!(
            summary,
            FlushSummary {
                repositories: 2,
                language_positions: 1,
                author_commits: 2,
            }
        );
        assert_eq!(summary.total(), 5);
        assert_eq!(store.insert_calls(), 3);
        assert_eq!(writer.pending_rows(), 0);
    }

    #[tokio::test]
    async fn test_flush_all_skips_empty_tables() {
        let store = Arc::new(InMemoryStore::new());
        let mut writer = BatchWriter::new(store.clone(), fast_retry(3));
        writer.stage_repositories(vec![repo("a")]);

        let summary = writer.flush_all().await.unwrap();
        assert_eq!(summary.repositories, 1);
        assert_eq!(summary.author_commits, 0);
        assert_eq!(store.insert_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_is_retried_as_a_whole() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next_inserts(2);
        let writer = BatchWriter::new(store.clone(), fast_retry(3));

        let written = writer
            .flush(&RowBatch::Repositories(vec![repo("a"), repo("b")]))
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.insert_calls(), 3);
        assert_eq!(store.repositories().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_flush() {
        let store = Arc::new(InMemoryStore::new());
        store.break_table(Table::AuthorCommits);
        let mut writer = BatchWriter::new(store.clone(), fast_retry(2));
        writer.stage_repositories(vec![repo("a")]);
        writer.stage_author_commits(vec![AuthorCommitRecord {
            repository: "a".to_string(),
            author: "Ann".to_string(),
            commits: 1,
        }]);

        let result = writer.flush_all().await;
        assert!(matches!(result, Err(WriteError::Insert { .. })));
        // repositories went first and stay written
        assert_eq!(store.repositories().len(), 1);
        assert!(store.author_commits().is_empty());
    }
}
