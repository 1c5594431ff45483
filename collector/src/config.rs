//! Collector configuration sections

use repopulse_shared::utils::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::github::limiter::{ResourceLimiter, WindowLimit};

/// The search API never returns more than this many results for a query.
pub const SEARCH_RESULT_CAP: usize = 1000;

/// `[github]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST API base URL
    pub api_url: String,

    /// Personal access token, sent as a bearer token
    pub token: Option<String>,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Attempts per request, the first one included
    pub max_retries: u32,

    /// Longest rate-limit reset the client will sleep through before giving up
    pub max_rate_limit_wait_secs: u64,

    /// Entries kept in the response cache
    pub cache_capacity: usize,

    pub cache_ttl_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            timeout_secs: 15,
            max_retries: 3,
            max_rate_limit_wait_secs: 60,
            cache_capacity: 1000,
            cache_ttl_secs: 900,
        }
    }
}

impl GitHubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            max_wait_hint: Duration::from_secs(self.max_rate_limit_wait_secs),
            ..RetryPolicy::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            anyhow::bail!("github.api_url must be an http(s) URL, got {:?}", self.api_url);
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("github.timeout_secs must be greater than 0");
        }
        if self.max_retries == 0 {
            anyhow::bail!("github.max_retries must be greater than 0");
        }
        if self.cache_capacity == 0 {
            anyhow::bail!("github.cache_capacity must be greater than 0");
        }
        Ok(())
    }
}

/// `[limits]` section: client-side sliding windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// In-flight requests across all resources
    pub max_concurrent: usize,

    pub requests_per_window: usize,

    pub window_secs: u64,

    /// Extra window applied to the search resource only
    pub search_requests_per_window: usize,

    pub search_window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 50,
            requests_per_window: 4500,
            window_secs: 3600,
            search_requests_per_window: 20,
            search_window_secs: 60,
        }
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.requests_per_window == 0 || self.search_requests_per_window == 0 {
            anyhow::bail!("limits: requests per window must be greater than 0");
        }
        if self.window_secs == 0 || self.search_window_secs == 0 {
            anyhow::bail!("limits: window length must be greater than 0");
        }
        Ok(())
    }

    /// Build the common limiter plus the search window.
    pub fn build_limiter(&self) -> ResourceLimiter {
        let common = WindowLimit {
            max_concurrent: (self.max_concurrent > 0).then_some(self.max_concurrent),
            max_requests: self.requests_per_window,
            window: Duration::from_secs(self.window_secs),
        };
        let search = WindowLimit {
            max_concurrent: None,
            max_requests: self.search_requests_per_window,
            window: Duration::from_secs(self.search_window_secs),
        };
        ResourceLimiter::new(common).with_resource("search", vec![search])
    }
}

/// `[ingest]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Restrict the listing to one primary language
    pub language: Option<String>,

    /// Repositories to collect
    pub top_n: usize,

    /// Page size for list endpoints, clamped to 1..=100
    pub per_page: usize,

    /// Detail fetches in flight at once
    pub concurrency: usize,

    /// Leaderboard entries searched for a repository's language position
    pub leaderboard_depth: usize,

    /// Commit pages read per repository
    pub commit_pages: usize,

    /// Offset east of UTC defining "today" for commit counting
    pub utc_offset_minutes: i32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            language: None,
            top_n: 100,
            per_page: 100,
            concurrency: 8,
            leaderboard_depth: 100,
            commit_pages: 10,
            utc_offset_minutes: 0,
        }
    }
}

impl IngestConfig {
    /// Language filter with blank values treated as unset.
    pub fn language(&self) -> Option<&str> {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.top_n == 0 {
            anyhow::bail!("ingest.top_n must be greater than 0");
        }
        if self.concurrency == 0 {
            anyhow::bail!("ingest.concurrency must be greater than 0");
        }
        if self.leaderboard_depth == 0 || self.leaderboard_depth > 100 {
            anyhow::bail!(
                "ingest.leaderboard_depth must be in 1..=100, got {}",
                self.leaderboard_depth
            );
        }
        if self.commit_pages == 0 {
            anyhow::bail!("ingest.commit_pages must be greater than 0");
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!(
                "ingest.utc_offset_minutes must be within one day, got {}",
                self.utc_offset_minutes
            );
        }
        Ok(())
    }
}
