//! ClickHouse storage backend
//!
//! Writes the three ingestion tables with RowBinary bulk inserts and runs the
//! hourly view-delta report as a single declarative query. Tables are expected
//! to exist already (see `sql/schema.sql`): `repositories` is a
//! `ReplacingMergeTree(updated)` ordered by `name`, the other two are plain
//! `MergeTree` tables.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use repopulse_shared::types::records::{
    AuthorCommitRecord, LanguagePositionRecord, RepositoryRecord,
};
use repopulse_shared::types::views::{HourlyDelta, PhraseViewDeltas};
use serde::{Deserialize, Serialize};

use super::{BatchStore, RowBatch};
use crate::config::{StoreConfig, TableNames};
use crate::error::{QueryError, WriteError};

/// ClickHouse `DateTime` is seconds since epoch as `UInt32`.
fn to_datetime_secs(ts: DateTime<Utc>) -> u32 {
    ts.timestamp().clamp(0, u32::MAX as i64) as u32
}

/// One row in the repositories table (matches ClickHouse schema).
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct RepositoryRow {
    pub name: String,
    pub owner: String,
    pub stars: i32,
    pub watchers: i32,
    pub forks: i32,
    pub language: String,
    pub updated: u32,
}

impl From<&RepositoryRecord> for RepositoryRow {
    fn from(r: &RepositoryRecord) -> Self {
        Self {
            name: r.name.clone(),
            owner: r.owner.clone(),
            stars: r.stars,
            watchers: r.watchers,
            forks: r.forks,
            language: r.language.clone(),
            updated: to_datetime_secs(r.updated),
        }
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct AuthorCommitRow {
    pub repository: String,
    pub author: String,
    pub commits: i32,
}

impl From<&AuthorCommitRecord> for AuthorCommitRow {
    fn from(r: &AuthorCommitRecord) -> Self {
        Self {
            repository: r.repository.clone(),
            author: r.author.clone(),
            commits: r.commits,
        }
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct PositionRow {
    pub repository: String,
    pub position: i32,
    pub language: String,
}

impl From<&LanguagePositionRecord> for PositionRow {
    fn from(r: &LanguagePositionRecord) -> Self {
        Self {
            repository: r.repository.clone(),
            position: r.position,
            language: r.language.clone(),
        }
    }
}

/// Report row: `views_by_hour` is `Array(Tuple(UInt8, Int64))`, newest hour
/// first.
#[derive(Debug, Row, Deserialize)]
struct ViewDeltaRow {
    phrase: String,
    views_by_hour: Vec<(u8, i64)>,
}

/// Hourly maxima per phrase, sorted by hour, differenced, filtered to
/// increases and reversed. `arrayDifference` yields 0 for the first element,
/// so the `> 0` filter also drops the hour without a predecessor.
pub fn view_deltas_sql(table: &str) -> String {
    format!(
        "SELECT
            phrase,
            arrayReverse(
                arrayFilter(
                    x -> x.2 > 0,
                    arrayZip(hours, arrayDifference(max_views))
                )
            ) AS views_by_hour
        FROM (
            SELECT
                phrase,
                arrayMap(x -> x.1, hourly) AS hours,
                arrayMap(x -> x.2, hourly) AS max_views
            FROM (
                SELECT
                    phrase,
                    arraySort(x -> x.1, groupArray((h, max_v))) AS hourly
                FROM (
                    SELECT
                        phrase,
                        toHour(dt) AS h,
                        toInt64(max(views)) AS max_v
                    FROM {table}
                    WHERE campaign_id = ? AND toDate(dt) = today()
                    GROUP BY phrase, h
                )
                GROUP BY phrase
            )
        )
        ORDER BY phrase"
    )
}

/// ClickHouse-backed store for the ingestion tables.
pub struct ClickHouseStore {
    client: Client,
    tables: TableNames,
}

impl ClickHouseStore {
    pub fn new(config: &StoreConfig) -> Self {
        let mut client = Client::default()
            .with_url(config.url())
            .with_database(&config.database)
            .with_option("connect_timeout", config.connect_timeout_secs.to_string())
            .with_option("send_timeout", config.send_receive_timeout_secs.to_string())
            .with_option("receive_timeout", config.send_receive_timeout_secs.to_string());
        if let Some(user) = &config.user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.password {
            client = client.with_password(password);
        }

        Self {
            client,
            tables: config.tables.clone(),
        }
    }

    /// Connect and verify the server answers.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let store = Self::new(config);
        store
            .client
            .query("SELECT 1")
            .execute()
            .await
            .with_context(|| format!("ClickHouse at {} is unreachable", config.url()))?;
        Ok(store)
    }

    async fn insert_rows<R, I>(&self, table: &str, rows: I) -> clickhouse::error::Result<()>
    where
        R: Row + Serialize,
        I: IntoIterator<Item = R>,
    {
        let mut insert = self.client.insert::<R>(table)?;
        for row in rows {
            insert.write(&row).await?;
        }
        insert.end().await
    }
}

#[async_trait]
impl BatchStore for ClickHouseStore {
    async fn insert(&self, batch: &RowBatch) -> Result<(), WriteError> {
        let result = match batch {
            RowBatch::Repositories(rows) => {
                let table = &self.tables.repositories;
                (table, self.insert_rows(table, rows.iter().map(RepositoryRow::from).collect::<Vec<_>>()).await)
            }
            RowBatch::AuthorCommits(rows) => {
                let table = &self.tables.author_commits;
                (table, self.insert_rows(table, rows.iter().map(AuthorCommitRow::from).collect::<Vec<_>>()).await)
            }
            RowBatch::LanguagePositions(rows) => {
                let table = &self.tables.positions;
                (table, self.insert_rows(table, rows.iter().map(PositionRow::from).collect::<Vec<_>>()).await)
            }
        };

        match result {
            (_, Ok(())) => Ok(()),
            (table, Err(clickhouse::error::Error::Network(e))) => Err(WriteError::Unavailable {
                message: format!("{}: {}", table, e),
            }),
            (table, Err(e)) => Err(WriteError::insert(table.as_str(), e.to_string())),
        }
    }

    async fn view_deltas(&self, campaign_id: i64) -> Result<Vec<PhraseViewDeltas>, QueryError> {
        let table = &self.tables.phrase_views;
        let rows = self
            .client
            .query(&view_deltas_sql(table))
            .bind(campaign_id)
            .fetch_all::<ViewDeltaRow>()
            .await
            .map_err(|e| QueryError {
                table: table.clone(),
                message: e.to_string(),
            })?;

        Ok(rows
            .into_iter()
            .map(|row| PhraseViewDeltas {
                phrase: row.phrase,
                deltas: row
                    .views_by_hour
                    .into_iter()
                    .map(|(hour, diff)| HourlyDelta { hour, diff })
                    .collect(),
            })
            .collect())
    }

    fn backend(&self) -> &'static str {
        "clickhouse"
    }
}
