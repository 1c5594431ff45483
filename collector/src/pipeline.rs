//! One ingestion run: collect, enrich, flush.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use repopulse_warehouse::{audit, BatchWriter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::collect::{DetailFailure, RepositoryCollector};
use crate::config::IngestConfig;
use crate::enrich::{CommitsByAuthor, DetailEnricher, LanguagePosition};
use crate::github::GitHubClient;

/// What a finished run wrote.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub repositories: usize,
    pub author_commits: usize,
    pub language_positions: usize,
    pub detail_failures: Vec<DetailFailure>,
    pub elapsed_secs: f64,
}

/// The two detail fetches made for every repository.
pub fn default_enrichers(
    client: &Arc<GitHubClient>,
    config: &IngestConfig,
) -> Vec<Arc<dyn DetailEnricher>> {
    vec![
        Arc::new(CommitsByAuthor::new(client.clone(), config)),
        Arc::new(LanguagePosition::new(client.clone(), config)),
    ]
}

/// Run one ingestion.
///
/// Nothing is written unless the listing succeeds. Every row of the run
/// carries the run start time as its version.
pub async fn run_ingestion(
    client: Arc<GitHubClient>,
    mut writer: BatchWriter,
    config: &IngestConfig,
) -> Result<RunSummary> {
    let started = Instant::now();
    let started_at = Utc::now();
    let run_id = started_at.format("%Y%m%dT%H%M%SZ").to_string();
    let language = config.language();

    audit::run_started(&run_id, language, config.top_n);
    info!(
        "Run {}: collecting top {} repositories ({})",
        run_id,
        config.top_n,
        language.unwrap_or("all languages")
    );

    let collector = RepositoryCollector::new(client.clone(), default_enrichers(&client, config), config);
    let collection = match collector.collect(language, config.top_n, started_at).await {
        Ok(collection) => collection,
        Err(e) => {
            audit::run_failed(&run_id, &e.to_string());
            return Err(e).context("Repository collection failed");
        }
    };

    let details = collection.pending.drain().await;
    writer.stage_repositories(collection.repositories);
    writer.stage_positions(details.positions);
    writer.stage_author_commits(details.author_commits);

    let flushed = match writer.flush_all().await {
        Ok(flushed) => flushed,
        Err(e) => {
            audit::run_failed(&run_id, &e.to_string());
            return Err(e).context("Flushing to the store failed");
        }
    };

    audit::run_finished(&run_id, flushed.repositories, details.failures.len());
    let summary = RunSummary {
        run_id,
        started_at,
        repositories: flushed.repositories,
        author_commits: flushed.author_commits,
        language_positions: flushed.language_positions,
        detail_failures: details.failures,
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    info!(
        "Run {} done in {:.1}s: {} repositories, {} author rows, {} positions, {} detail failures",
        summary.run_id,
        summary.elapsed_secs,
        summary.repositories,
        summary.author_commits,
        summary.language_positions,
        summary.detail_failures.len()
    );
    Ok(summary)
}
