//! Server-reported quota tracking
//!
//! The API reports the remaining quota of each resource in response headers.
//! [`QuotaTracker`] keeps the latest report per resource and makes callers
//! wait for the reset once it is used up.

use chrono::{DateTime, Utc};
use repopulse_shared::utils::time::from_epoch_secs;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::RESET_SLACK;
use crate::http::{header_get, HttpHeaders};
use crate::metrics;

/// Quota of one resource within its current reset window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Quota values parsed from `x-ratelimit-*` response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaHeaders {
    /// `x-ratelimit-resource`, when the server names one
    pub resource: Option<String>,
    pub quota: Quota,
}

impl QuotaHeaders {
    /// `None` unless both remaining and reset are present and numeric.
    pub fn parse(headers: &HttpHeaders) -> Option<Self> {
        let remaining = header_get(headers, "x-ratelimit-remaining")?
            .trim()
            .parse::<u32>()
            .ok()?;
        let reset = header_get(headers, "x-ratelimit-reset")?
            .trim()
            .parse::<i64>()
            .ok()?;
        let limit = header_get(headers, "x-ratelimit-limit").and_then(|v| v.trim().parse().ok());
        let resource = header_get(headers, "x-ratelimit-resource")
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Some(Self {
            resource,
            quota: Quota {
                limit,
                remaining,
                reset_at: from_epoch_secs(reset),
            },
        })
    }
}

/// Per-resource quota state shared by every request of a client.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    state: Mutex<HashMap<String, Quota>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, resource: &str) -> Option<Quota> {
        self.state.lock().await.get(resource).cloned()
    }

    /// Wait until `resource` has quota left, then reserve one request of it.
    ///
    /// The check and the reservation happen under one lock, so two tasks can
    /// never both spend the last unit. Unknown resources and windows that have
    /// already reset pass straight through. Returns the time spent waiting.
    pub async fn acquire(&self, resource: &str) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let (wait, reset_at) = {
                let mut state = self.state.lock().await;
                let Some(quota) = state.get_mut(resource) else {
                    return waited;
                };
                let now = Utc::now();
                if now >= quota.reset_at {
                    state.remove(resource);
                    return waited;
                }
                if quota.remaining > 0 {
                    quota.remaining -= 1;
                    return waited;
                }
                let until_reset = (quota.reset_at - now).to_std().unwrap_or_default();
                (until_reset + RESET_SLACK, quota.reset_at)
            };

            warn!(
                "Quota for {} exhausted, waiting {:?} until reset at {}",
                resource, wait, reset_at
            );
            metrics::RATE_LIMIT_WAITS.with_label_values(&[resource]).inc();
            metrics::RATE_LIMIT_WAIT_SECONDS.inc_by(wait.as_secs_f64());
            tokio::time::sleep(wait).await;
            waited += wait;

            // The window we slept through is over. If nobody has reported a
            // newer window meanwhile, drop it and proceed.
            let mut state = self.state.lock().await;
            match state.get(resource) {
                Some(quota) if quota.reset_at != reset_at => continue,
                _ => {
                    state.remove(resource);
                    return waited;
                }
            }
        }
    }

    /// Apply a server report. Within the same reset window the remaining count
    /// only goes down, so reservations made by in-flight requests survive
    /// stale headers.
    pub async fn update(&self, resource: &str, report: Quota) {
        metrics::QUOTA_REMAINING
            .with_label_values(&[resource])
            .set(report.remaining as f64);

        let mut state = self.state.lock().await;
        match state.get_mut(resource) {
            Some(current) if current.reset_at == report.reset_at => {
                current.remaining = current.remaining.min(report.remaining);
                current.limit = report.limit.or(current.limit);
            }
            _ => {
                debug!(
                    "Quota for {}: {} remaining until {}",
                    resource, report.remaining, report.reset_at
                );
                state.insert(resource.to_string(), report);
            }
        }
    }

    /// Record that the server refused a request for lack of quota.
    pub async fn mark_exhausted(&self, resource: &str, reset_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let limit = state.get(resource).and_then(|q| q.limit);
        state.insert(
            resource.to_string(),
            Quota {
                limit,
                remaining: 0,
                reset_at,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn quota(remaining: u32, reset_in_secs: i64) -> Quota {
        Quota {
            limit: Some(5000),
            remaining,
            reset_at: Utc::now() + chrono::Duration::seconds(reset_in_secs),
        }
    }

    #[test]
    fn test_parse_headers() {
        let parsed = QuotaHeaders::parse(&headers(&[
            ("X-RateLimit-Limit", "30"),
            ("X-RateLimit-Remaining", "29"),
            ("X-RateLimit-Reset", "1700000000"),
            ("X-RateLimit-Resource", "search"),
        ]))
        .unwrap();
        assert_eq!(parsed.resource.as_deref(), Some("search"));
        assert_eq!(parsed.quota.limit, Some(30));
        assert_eq!(parsed.quota.remaining, 29);
        assert_eq!(parsed.quota.reset_at.timestamp(), 1_700_000_000);

        assert!(QuotaHeaders::parse(&headers(&[("x-ratelimit-remaining", "1")])).is_none());
        assert!(QuotaHeaders::parse(&headers(&[
            ("x-ratelimit-remaining", "many"),
            ("x-ratelimit-reset", "1"),
        ]))
        .is_none());
    }

    #[tokio::test]
    async fn test_acquire_reserves_quota() {
        let tracker = QuotaTracker::new();
        assert_eq!(tracker.acquire("core").await, Duration::ZERO);

        tracker.update("core", quota(2, 600)).await;
        tracker.acquire("core").await;
        tracker.acquire("core").await;
        assert_eq!(tracker.get("core").await.unwrap().remaining, 0);
    }

    #[tokio::test]
    async fn test_stale_report_does_not_raise_remaining() {
        let tracker = QuotaTracker::new();
        let report = quota(10, 600);
        tracker.update("core", report.clone()).await;
        tracker.acquire("core").await;
        tracker.acquire("core").await;

        // A response that left the server before the two reservations.
        tracker.update("core", Quota { remaining: 9, ..report.clone() }).await;
        assert_eq!(tracker.get("core").await.unwrap().remaining, 8);

        // A new window replaces the old one.
        let next = Quota {
            remaining: 5000,
            reset_at: report.reset_at + chrono::Duration::seconds(3600),
            ..report
        };
        tracker.update("core", next).await;
        assert_eq!(tracker.get("core").await.unwrap().remaining, 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_quota_waits_for_reset() {
        let tracker = QuotaTracker::new();
        tracker.update("core", quota(0, 30)).await;

        let start = tokio::time::Instant::now();
        let waited = tracker.acquire("core").await;
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(waited >= Duration::from_secs(30));
        assert!(tracker.get("core").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_does_not_block_other_resources() {
        let tracker = Arc::new(QuotaTracker::new());
        tracker.mark_exhausted("search", Utc::now() + chrono::Duration::seconds(60)).await;

        let start = tokio::time::Instant::now();
        assert_eq!(tracker.acquire("core").await, Duration::ZERO);
        assert!(start.elapsed() < Duration::from_secs(1));

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.acquire("search").await })
        };
        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_secs(59));
    }

    #[tokio::test]
    async fn test_expired_window_passes_through() {
        let tracker = QuotaTracker::new();
        tracker.update("core", quota(0, -5)).await;
        assert_eq!(tracker.acquire("core").await, Duration::ZERO);
    }
}
