//! GitHub API payloads
//!
//! Only the fields the collector reads are declared; everything else in the
//! responses is ignored.

use chrono::{DateTime, Utc};
use repopulse_shared::types::records::RepositoryRecord;
use serde::Deserialize;

/// `GET /search/repositories`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<ApiRepository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRepository {
    pub name: String,
    pub full_name: String,
    pub owner: ApiOwner,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub watchers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOwner {
    pub login: String,
}

impl ApiRepository {
    pub fn to_record(&self, updated: DateTime<Utc>) -> RepositoryRecord {
        RepositoryRecord {
            name: self.name.clone(),
            owner: self.owner.login.clone(),
            stars: saturate(self.stargazers_count),
            watchers: saturate(self.watchers_count),
            forks: saturate(self.forks_count),
            language: self.language.clone().unwrap_or_default(),
            updated,
        }
    }
}

fn saturate(count: i64) -> i32 {
    count.clamp(0, i32::MAX as i64) as i32
}

/// One element of `GET /repos/{owner}/{repo}/commits`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommit {
    #[serde(default)]
    pub sha: String,
    pub commit: ApiCommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommitDetail {
    pub author: Option<ApiCommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommitAuthor {
    pub name: Option<String>,
}

impl ApiCommit {
    /// Git author name, if the commit carries one.
    pub fn author_name(&self) -> Option<&str> {
        self.commit
            .author
            .as_ref()
            .and_then(|a| a.name.as_deref())
            .filter(|n| !n.is_empty())
    }
}

/// Error body returned with 4xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

/// A list endpoint's page payload.
pub trait Page {
    type Item;

    fn into_items(self) -> Vec<Self::Item>;
}

impl Page for SearchResponse {
    type Item = ApiRepository;

    fn into_items(self) -> Vec<ApiRepository> {
        self.items
    }
}

impl<T> Page for Vec<T> {
    type Item = T;

    fn into_items(self) -> Vec<T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_item_to_record() {
        let item: ApiRepository = serde_json::from_value(serde_json::json!({
            "name": "tokio",
            "full_name": "tokio-rs/tokio",
            "owner": {"login": "tokio-rs"},
            "stargazers_count": 25000,
            "watchers_count": 25000,
            "forks_count": 2300,
            "language": null,
            "private": false
        }))
        .unwrap();
        let updated = Utc::now();
        let record = item.to_record(updated);
        assert_eq!(record.name, "tokio");
        assert_eq!(record.owner, "tokio-rs");
        assert_eq!(record.stars, 25000);
        assert_eq!(record.forks, 2300);
        assert_eq!(record.language, "");
        assert_eq!(record.updated, updated);
    }

    #[test]
    fn test_search_response_flags() {
        let page: SearchResponse = serde_json::from_value(serde_json::json!({
            "total_count": 123456,
            "incomplete_results": true,
            "items": []
        }))
        .unwrap();
        assert_eq!(page.total_count, 123456);
        assert!(page.incomplete_results);

        let bare: SearchResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!bare.incomplete_results);
        assert!(bare.items.is_empty());
    }

    #[test]
    fn test_counts_saturate() {
        assert_eq!(saturate(i64::MAX), i32::MAX);
        assert_eq!(saturate(-1), 0);
    }

    #[test]
    fn test_commit_author_name() {
        let commits: Vec<ApiCommit> = serde_json::from_value(serde_json::json!([
            {"sha": "a1", "commit": {"author": {"name": "Ann", "email": "a@x"}}},
            {"sha": "b2", "commit": {"author": null}},
            {"sha": "c3", "commit": {"author": {"name": ""}}}
        ]))
        .unwrap();
        assert_eq!(commits[0].author_name(), Some("Ann"));
        assert_eq!(commits[1].author_name(), None);
        assert_eq!(commits[2].author_name(), None);
    }
}
