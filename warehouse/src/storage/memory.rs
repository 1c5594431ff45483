//! In-memory store
//!
//! Keeps every inserted row and emulates the store's replace-on-merge
//! behaviour on read. Used for dry runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use repopulse_shared::types::records::{
    AuthorCommitRecord, LanguagePositionRecord, PhraseViewSample, RepositoryRecord,
};
use repopulse_shared::types::views::{hourly_deltas, PhraseViewDeltas};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{BatchStore, RowBatch, Table};
use crate::error::{QueryError, WriteError};

#[derive(Debug, Default)]
struct Tables {
    repositories: Vec<RepositoryRecord>,
    author_commits: Vec<AuthorCommitRecord>,
    positions: Vec<LanguagePositionRecord>,
    samples: Vec<PhraseViewSample>,
}

/// Thread-safe in-memory implementation of [`BatchStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    insert_calls: AtomicUsize,
    /// Number of upcoming inserts that fail, for exercising retries.
    failures_left: AtomicUsize,
    /// When set, every insert into this table fails.
    broken_table: RwLock<Option<Table>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` inserts fail with [`WriteError::Unavailable`].
    pub fn fail_next_inserts(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Make every insert into `table` fail.
    pub fn break_table(&self, table: Table) {
        if let Ok(mut guard) = self.broken_table.write() {
            *guard = Some(table);
        }
    }

    /// Number of insert calls that reached the store, failed ones included.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Seed raw phrase view samples for the report.
    pub fn add_samples(&self, samples: impl IntoIterator<Item = PhraseViewSample>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.samples.extend(samples);
        }
    }

    /// Every repository row ever inserted, duplicates included.
    pub fn repositories(&self) -> Vec<RepositoryRecord> {
        self.tables
            .read()
            .map(|t| t.repositories.clone())
            .unwrap_or_default()
    }

    pub fn author_commits(&self) -> Vec<AuthorCommitRecord> {
        self.tables
            .read()
            .map(|t| t.author_commits.clone())
            .unwrap_or_default()
    }

    pub fn positions(&self) -> Vec<LanguagePositionRecord> {
        self.tables
            .read()
            .map(|t| t.positions.clone())
            .unwrap_or_default()
    }

    /// Repository rows as they look once the store has merged: one row per
    /// name, the one with the greatest `updated`. On equal versions the last
    /// inserted row wins. Sorted by name.
    pub fn merged_repositories(&self) -> Vec<RepositoryRecord> {
        let mut latest: HashMap<String, RepositoryRecord> = HashMap::new();
        for row in self.repositories() {
            match latest.get(&row.name) {
                Some(current) if current.updated > row.updated => {}
                _ => {
                    latest.insert(row.name.clone(), row);
                }
            }
        }
        let mut merged: Vec<RepositoryRecord> = latest.into_values().collect();
        merged.sort_by(|a, b| a.name.cmp(&b.name));
        merged
    }

    fn check_failure(&self, table: Table) -> Result<(), WriteError> {
        let broken = self.broken_table.read().ok().and_then(|g| *g);
        if broken == Some(table) {
            return Err(WriteError::insert(table.as_str(), "table is broken"));
        }
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(WriteError::Unavailable {
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchStore for InMemoryStore {
    async fn insert(&self, batch: &RowBatch) -> Result<(), WriteError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(batch.table())?;

        let mut tables = self.tables.write().map_err(|e| WriteError::Unavailable {
            message: e.to_string(),
        })?;
        match batch {
            RowBatch::Repositories(rows) => tables.repositories.extend_from_slice(rows),
            RowBatch::AuthorCommits(rows) => tables.author_commits.extend_from_slice(rows),
            RowBatch::LanguagePositions(rows) => tables.positions.extend_from_slice(rows),
        }
        Ok(())
    }

    async fn view_deltas(&self, campaign_id: i64) -> Result<Vec<PhraseViewDeltas>, QueryError> {
        let tables = self.tables.read().map_err(|e| QueryError {
            table: "phrases_views".to_string(),
            message: e.to_string(),
        })?;
        Ok(hourly_deltas(
            &tables.samples,
            campaign_id,
            Utc::now().date_naive(),
        ))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
