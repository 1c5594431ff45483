//! Analytical store configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// ClickHouse host name
    pub host: String,

    /// ClickHouse HTTP interface port
    pub port: u16,

    /// Use https instead of http
    pub secure: bool,

    pub user: Option<String>,

    pub password: Option<String>,

    /// Database holding the ingestion tables
    pub database: String,

    pub connect_timeout_secs: u64,

    pub send_receive_timeout_secs: u64,

    /// Attempts per table flush before the run fails
    pub flush_attempts: u32,

    pub tables: TableNames,
}

/// Physical table names for each logical table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub repositories: String,
    pub author_commits: String,
    pub positions: String,
    pub phrase_views: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            secure: false,
            user: None,
            password: None,
            database: "default".to_string(),
            connect_timeout_secs: 10,
            send_receive_timeout_secs: 30,
            flush_attempts: 3,
            tables: TableNames::default(),
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            repositories: "repositories".to_string(),
            author_commits: "repositories_authors_commits".to_string(),
            positions: "repositories_positions".to_string(),
            phrase_views: "phrases_views".to_string(),
        }
    }
}

impl StoreConfig {
    /// HTTP endpoint URL for the ClickHouse client
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("ClickHouse host must not be empty");
        }
        if self.database.trim().is_empty() {
            anyhow::bail!("ClickHouse database must not be empty");
        }
        if self.flush_attempts == 0 {
            anyhow::bail!("flush_attempts must be greater than 0");
        }
        for name in [
            &self.tables.repositories,
            &self.tables.author_commits,
            &self.tables.positions,
            &self.tables.phrase_views,
        ] {
            if !is_valid_identifier(name) {
                anyhow::bail!("Invalid table name: {:?}", name);
            }
        }
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers
/// (optionally `db.table`) are accepted.
fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
