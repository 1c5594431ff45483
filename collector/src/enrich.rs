//! Per-repository detail enrichment

use async_trait::async_trait;
use chrono::Utc;
use repopulse_shared::types::records::{
    AuthorCommitRecord, LanguagePositionRecord, RepositoryRecord,
};
use repopulse_shared::utils::time::{day_start_utc, to_api_timestamp};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::error::FetchError;
use crate::github::pagination::{Paginator, MAX_PER_PAGE};
use crate::github::types::{ApiCommit, SearchResponse};
use crate::github::{ApiRequest, ApiResource, GitHubClient};

/// Rows produced by one enricher for one repository.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailRows {
    AuthorCommits(Vec<AuthorCommitRecord>),
    Positions(Vec<LanguagePositionRecord>),
}

impl DetailRows {
    pub fn len(&self) -> usize {
        match self {
            DetailRows::AuthorCommits(rows) => rows.len(),
            DetailRows::Positions(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One kind of detail fetched for every collected repository.
#[async_trait]
pub trait DetailEnricher: Send + Sync {
    /// Label for logs and metrics.
    fn name(&self) -> &'static str;

    async fn enrich(&self, repository: &RepositoryRecord) -> Result<DetailRows, FetchError>;
}

/// Commits since the start of the current day, counted per author name.
pub struct CommitsByAuthor {
    client: Arc<GitHubClient>,
    max_pages: usize,
    utc_offset_minutes: i32,
}

impl CommitsByAuthor {
    pub fn new(client: Arc<GitHubClient>, config: &IngestConfig) -> Self {
        Self {
            client,
            max_pages: config.commit_pages,
            utc_offset_minutes: config.utc_offset_minutes,
        }
    }
}

/// Group commits by author name, sorted by name. Commits without an author
/// name are skipped.
pub fn count_by_author(repository: &str, commits: &[ApiCommit]) -> Vec<AuthorCommitRecord> {
    let mut counts: BTreeMap<&str, i32> = BTreeMap::new();
    for commit in commits {
        match commit.author_name() {
            Some(author) => *counts.entry(author).or_default() += 1,
            None => debug!("Commit {} in {} has no author, skipped", commit.sha, repository),
        }
    }
    counts
        .into_iter()
        .map(|(author, commits)| AuthorCommitRecord {
            repository: repository.to_string(),
            author: author.to_string(),
            commits,
        })
        .collect()
}

#[async_trait]
impl DetailEnricher for CommitsByAuthor {
    fn name(&self) -> &'static str {
        "commits_by_author"
    }

    async fn enrich(&self, repository: &RepositoryRecord) -> Result<DetailRows, FetchError> {
        let since = day_start_utc(Utc::now(), self.utc_offset_minutes);
        let url = self.client.endpoint(
            &format!("/repos/{}/{}/commits", repository.owner, repository.name),
            &[("since", to_api_timestamp(since))],
        )?;

        let pages = Paginator::<Vec<ApiCommit>>::new(self.client.clone(), url, ApiResource::Core)
            .per_page(MAX_PER_PAGE)
            .max_pages(self.max_pages);
        let commits = match pages.collect_all().await {
            Ok(commits) => commits,
            // 409: the repository has no commits at all
            Err(e) if e.status() == Some(409) => {
                debug!("{} is empty", repository.full_name());
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        Ok(DetailRows::AuthorCommits(count_by_author(
            &repository.name,
            &commits,
        )))
    }
}

/// 1-based rank of a repository among the most-starred repositories of its
/// primary language.
pub struct LanguagePosition {
    client: Arc<GitHubClient>,
    depth: usize,
    /// One lock per language: repositories sharing a language wait for the
    /// one cached leaderboard instead of each fetching it, while different
    /// languages are looked up in parallel.
    lookups: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LanguagePosition {
    pub fn new(client: Arc<GitHubClient>, config: &IngestConfig) -> Self {
        Self {
            client,
            depth: config.leaderboard_depth.clamp(1, MAX_PER_PAGE),
            lookups: Mutex::new(HashMap::new()),
        }
    }

    async fn lookup_lock(&self, language: &str) -> Arc<Mutex<()>> {
        let mut lookups = self.lookups.lock().await;
        lookups
            .entry(language.to_ascii_lowercase())
            .or_default()
            .clone()
    }

    async fn leaderboard(&self, language: &str) -> Result<SearchResponse, FetchError> {
        let url = self.client.endpoint(
            "/search/repositories",
            &[
                ("q", format!("language:{}", language)),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("per_page", self.depth.to_string()),
                ("page", "1".to_string()),
            ],
        )?;
        let lock = self.lookup_lock(language).await;
        let _lookup = lock.lock().await;
        self.client
            .get_json_with_retry(&ApiRequest::new(url, ApiResource::Search).cacheable())
            .await
    }
}

#[async_trait]
impl DetailEnricher for LanguagePosition {
    fn name(&self) -> &'static str {
        "language_position"
    }

    async fn enrich(&self, repository: &RepositoryRecord) -> Result<DetailRows, FetchError> {
        let Some(language) = repository.language() else {
            return Ok(DetailRows::Positions(Vec::new()));
        };

        let board = self.leaderboard(language).await?;
        if board.incomplete_results {
            warn!(
                "{} leaderboard timed out server-side; positions may be missing",
                language
            );
        }
        let full_name = repository.full_name();
        let rows = board
            .items
            .iter()
            .position(|item| item.full_name.eq_ignore_ascii_case(&full_name))
            .map(|index| LanguagePositionRecord {
                repository: repository.name.clone(),
                position: index as i32 + 1,
                language: language.to_string(),
            })
            .into_iter()
            .collect::<Vec<_>>();

        if rows.is_empty() {
            debug!(
                "{} is not in the top {} of {} {} repositories",
                full_name, self.depth, board.total_count, language
            );
        }
        Ok(DetailRows::Positions(rows))
    }
}
