//! Repository collection library
//!
//! Talks to the GitHub REST API through a rate-limited client, lists the top
//! repositories, enriches each one with detail rows and hands everything to
//! the warehouse batch writer.

pub mod collect;
pub mod config;
pub mod enrich;
pub mod error;
pub mod github;
pub mod http;
pub mod metrics;
pub mod pipeline;

pub use collect::{Collection, DetailFailure, DetailTasks, DrainedDetails, RepositoryCollector};
pub use config::{GitHubConfig, IngestConfig, LimitsConfig};
pub use enrich::{CommitsByAuthor, DetailEnricher, DetailRows, LanguagePosition};
pub use error::{CollectError, FetchError};
pub use github::GitHubClient;
pub use pipeline::{run_ingestion, RunSummary};
