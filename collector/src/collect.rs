//! Top-repository listing and detail scheduling

use chrono::{DateTime, Utc};
use repopulse_shared::types::records::{
    AuthorCommitRecord, LanguagePositionRecord, RepositoryRecord,
};
use repopulse_shared::utils::clamp_logged;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{IngestConfig, SEARCH_RESULT_CAP};
use crate::enrich::{DetailEnricher, DetailRows};
use crate::error::{CollectError, FetchError};
use crate::github::pagination::{Paginator, MAX_PER_PAGE};
use crate::github::types::SearchResponse;
use crate::github::{ApiResource, GitHubClient};
use crate::metrics;

/// Lists the most-starred repositories and schedules their detail fetches.
pub struct RepositoryCollector {
    client: Arc<GitHubClient>,
    enrichers: Vec<Arc<dyn DetailEnricher>>,
    per_page: usize,
    detail_slots: Arc<Semaphore>,
}

/// Outcome of the listing phase. Detail fetches keep running in `pending`.
pub struct Collection {
    pub repositories: Vec<RepositoryRecord>,
    pub pending: DetailTasks,
}

struct DetailOutcome {
    repository: String,
    enricher: &'static str,
    result: Result<DetailRows, FetchError>,
}

/// A detail fetch that was given up on. The repository row is still written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailFailure {
    pub repository: String,
    pub enricher: String,
    pub error: String,
}

/// Detail rows gathered from every finished task.
#[derive(Debug, Default)]
pub struct DrainedDetails {
    pub author_commits: Vec<AuthorCommitRecord>,
    pub positions: Vec<LanguagePositionRecord>,
    pub failures: Vec<DetailFailure>,
}

/// Detail fetches in flight, at most `concurrency` running at once.
pub struct DetailTasks {
    tasks: JoinSet<DetailOutcome>,
    slots: Arc<Semaphore>,
}

impl DetailTasks {
    fn new(slots: Arc<Semaphore>) -> Self {
        Self {
            tasks: JoinSet::new(),
            slots,
        }
    }

    fn spawn(&mut self, enricher: Arc<dyn DetailEnricher>, repository: RepositoryRecord) {
        let slots = self.slots.clone();
        self.tasks.spawn(async move {
            // Never closed; a failed acquire would only mean running unbounded.
            let _slot = slots.acquire_owned().await.ok();
            let result = enricher.enrich(&repository).await;
            DetailOutcome {
                repository: repository.full_name(),
                enricher: enricher.name(),
                result,
            }
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task, in completion order. Failed fetches are logged
    /// and reported; they never fail the drain.
    pub async fn drain(mut self) -> DrainedDetails {
        let mut drained = DrainedDetails::default();
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Detail task did not complete: {}", e);
                    drained.failures.push(DetailFailure {
                        repository: "unknown".to_string(),
                        enricher: "unknown".to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match outcome.result {
                Ok(DetailRows::AuthorCommits(rows)) => drained.author_commits.extend(rows),
                Ok(DetailRows::Positions(rows)) => drained.positions.extend(rows),
                Err(e) => {
                    warn!(
                        "{} failed for {}, detail rows skipped: {}",
                        outcome.enricher, outcome.repository, e
                    );
                    metrics::DETAIL_FAILURES
                        .with_label_values(&[outcome.enricher])
                        .inc();
                    drained.failures.push(DetailFailure {
                        repository: outcome.repository,
                        enricher: outcome.enricher.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        drained
    }
}

impl RepositoryCollector {
    pub fn new(
        client: Arc<GitHubClient>,
        enrichers: Vec<Arc<dyn DetailEnricher>>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            client,
            enrichers,
            per_page: clamp_logged("per_page", config.per_page, 1, MAX_PER_PAGE),
            detail_slots: Arc::new(Semaphore::new(config.concurrency.max(1))),
        }
    }

    /// Search URL listing repositories by stars, optionally for one language.
    pub fn search_url(&self, language: Option<&str>) -> Result<String, FetchError> {
        let query = match language {
            Some(language) => format!("language:{}", language),
            None => "stars:>1".to_string(),
        };
        self.client.endpoint(
            "/search/repositories",
            &[
                ("q", query),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
            ],
        )
    }

    /// List the top `top_n` repositories and start their detail fetches.
    ///
    /// Every record gets `updated` as its version. A listing failure drops
    /// the collection, which cancels any detail fetch already started.
    pub async fn collect(
        &self,
        language: Option<&str>,
        top_n: usize,
        updated: DateTime<Utc>,
    ) -> Result<Collection, CollectError> {
        if top_n == 0 {
            return Err(CollectError::InvalidTopN);
        }
        let top_n = clamp_logged("top_n", top_n, 1, SEARCH_RESULT_CAP);
        let per_page = self.per_page.min(top_n);

        let mut pages =
            Paginator::<SearchResponse>::new(self.client.clone(), self.search_url(language)?, ApiResource::Search)
                .per_page(per_page)
                .max_pages(SEARCH_RESULT_CAP.div_ceil(per_page));

        let mut seen = HashSet::new();
        let mut repositories = Vec::with_capacity(top_n);
        let mut pending = DetailTasks::new(self.detail_slots.clone());

        while repositories.len() < top_n {
            let Some(items) = pages.next_page().await? else {
                break;
            };
            for item in items {
                if repositories.len() >= top_n {
                    break;
                }
                if !seen.insert(item.full_name.clone()) {
                    debug!("{} listed twice, skipping", item.full_name);
                    continue;
                }
                let record = item.to_record(updated);
                for enricher in &self.enrichers {
                    pending.spawn(enricher.clone(), record.clone());
                }
                repositories.push(record);
            }
        }

        if repositories.len() < top_n {
            warn!(
                "Listing exhausted after {} of {} requested repositories",
                repositories.len(),
                top_n
            );
        }
        info!(
            "Collected {} repositories over {} pages, {} detail fetches scheduled",
            repositories.len(),
            pages.pages_fetched(),
            pending.len()
        );
        metrics::REPOSITORIES_COLLECTED.inc_by(repositories.len() as f64);

        Ok(Collection {
            repositories,
            pending,
        })
    }
}
