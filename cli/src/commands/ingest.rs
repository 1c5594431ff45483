//! Ingest command implementation

use anyhow::{Context, Result};
use clap::Args;
use repopulse_collector::{run_ingestion, GitHubClient};
use repopulse_shared::utils::retry::RetryPolicy;
use repopulse_warehouse::metrics::encode_metrics;
use repopulse_warehouse::storage::clickhouse::ClickHouseStore;
use repopulse_warehouse::storage::memory::InMemoryStore;
use repopulse_warehouse::{BatchStore, BatchWriter, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::output;
use crate::settings::Settings;

#[derive(Args, Debug, Default)]
pub struct IngestArgs {
    /// Only repositories whose primary language is this one
    #[arg(short, long)]
    pub language: Option<String>,

    /// Number of most-starred repositories to collect (at most 1000)
    #[arg(short = 'n', long)]
    pub top_n: Option<usize>,

    /// Detail fetches in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Collect and summarize without writing to ClickHouse
    #[arg(long)]
    pub dry_run: bool,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestArgs {
    /// Flags take precedence over file and environment settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(language) = &self.language {
            settings.ingest.language = Some(language.clone());
        }
        if let Some(top_n) = self.top_n {
            settings.ingest.top_n = top_n;
        }
        if let Some(concurrency) = self.concurrency {
            settings.ingest.concurrency = concurrency;
        }
        if let Some(token) = &self.token {
            settings.github.token = Some(token.clone());
        }
    }
}

/// Each table flush is retried as a whole up to `flush_attempts` times.
fn flush_retry_policy(config: &StoreConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.flush_attempts,
        ..RetryPolicy::default()
    }
}

pub async fn run(args: IngestArgs, mut settings: Settings) -> Result<()> {
    args.apply(&mut settings);
    settings.validate()?;

    if settings.github.token.is_none() {
        output::warning("No GitHub token configured; unauthenticated rate limits apply");
    }

    let client = Arc::new(
        GitHubClient::new(&settings.github, &settings.limits)
            .context("Failed to build the GitHub HTTP client")?,
    );

    let dry_run_store = args.dry_run.then(|| Arc::new(InMemoryStore::new()));
    let store: Arc<dyn BatchStore> = match &dry_run_store {
        Some(memory) => {
            info!("Dry run: rows are kept in memory");
            memory.clone()
        }
        None => Arc::new(
            ClickHouseStore::connect(&settings.clickhouse)
                .await
                .context("Failed to connect to ClickHouse")?,
        ),
    };
    let writer = BatchWriter::new(store, flush_retry_policy(&settings.clickhouse));

    let result = run_ingestion(client, writer, &settings.ingest).await;

    // Metrics are worth keeping for failed runs too.
    if let Some(path) = &args.metrics_out {
        write_metrics(path)?;
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            error!("Ingestion run failed: {:#}", e);
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::print_run_summary(&summary);
        if let Some(memory) = &dry_run_store {
            let merged = memory.merged_repositories();
            output::info(&format!("{} repositories (dry run, not written):", merged.len()));
            output::print_repositories(&merged);
        }
    }

    Ok(())
}

fn write_metrics(path: &Path) -> Result<()> {
    std::fs::write(path, encode_metrics())
        .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    info!("Metrics written to {}", path.display());
    Ok(())
}
