//! Ingested record types
//!
//! One struct per logical table. All records are created fresh for each
//! ingestion run and never mutated after they are handed to the writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository metadata row.
///
/// Identity key is `name`. The store keeps the row with the greatest
/// `updated` per name (replace-on-merge), so readers may briefly observe
/// duplicates until the merge happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub owner: String,
    pub stars: i32,
    pub watchers: i32,
    pub forks: i32,
    /// Primary language, empty when the API reports none.
    pub language: String,
    /// Version column for replace-on-merge. Set to the run start time.
    pub updated: DateTime<Utc>,
}

impl RepositoryRecord {
    /// `owner/name`, the form the API uses in search results and routes.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Language as an option, treating the empty string as unset.
    pub fn language(&self) -> Option<&str> {
        if self.language.is_empty() {
            None
        } else {
            Some(&self.language)
        }
    }
}

/// Commits by one author in one repository for the current day.
///
/// Append-only: repeated runs add rows rather than replacing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCommitRecord {
    pub repository: String,
    pub author: String,
    pub commits: i32,
}

/// A repository's 1-based rank among repositories of its primary language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePositionRecord {
    pub repository: String,
    pub position: i32,
    pub language: String,
}

/// Raw phrase view sample from the externally populated time-series table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseViewSample {
    pub phrase: String,
    pub dt: DateTime<Utc>,
    pub campaign_id: i64,
    pub views: i64,
}
