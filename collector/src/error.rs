//! Collector error types

use chrono::{DateTime, Utc};
use repopulse_shared::utils::retry::Retryable;
use std::time::Duration;
use thiserror::Error;

/// Extra wait after a rate-limit reset before the next request.
pub const RESET_SLACK: Duration = Duration::from_secs(1);

/// A single API request failed.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network failure or 5xx; the same request may succeed later.
    #[error("transient failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// Quota exhausted for `resource` until `reset_at`.
    #[error("rate limited on {resource} until {reset_at}")]
    RateLimited {
        resource: String,
        reset_at: DateTime<Utc>,
    },

    /// 4xx other than rate limiting. Retrying will not help.
    #[error("{url} returned {status}: {message}")]
    Permanent {
        status: u16,
        message: String,
        url: String,
    },

    #[error("cannot decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("invalid request URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// HTTP status for permanent failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Permanent { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Transient { .. } | FetchError::RateLimited { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { reset_at, .. } => {
                let until_reset = (*reset_at - Utc::now()).to_std().unwrap_or_default();
                Some(until_reset + RESET_SLACK)
            }
            _ => None,
        }
    }
}

/// The collection phase cannot continue; the run is aborted.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("top_n must be greater than 0")]
    InvalidTopN,

    #[error("repository listing failed: {0}")]
    Listing(#[from] FetchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let transient = FetchError::Transient {
            url: "u".to_string(),
            message: "reset".to_string(),
        };
        let permanent = FetchError::Permanent {
            status: 404,
            message: "Not Found".to_string(),
            url: "u".to_string(),
        };
        let decode = FetchError::Decode {
            url: "u".to_string(),
            message: "eof".to_string(),
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert!(!decode.is_transient());
        assert_eq!(permanent.status(), Some(404));
        assert_eq!(transient.status(), None);
    }

    #[test]
    fn test_rate_limit_hint_includes_slack() {
        let err = FetchError::RateLimited {
            resource: "core".to_string(),
            reset_at: Utc::now() + chrono::Duration::seconds(10),
        };
        assert!(err.is_transient());
        let hint = err.retry_after().unwrap();
        assert!(hint > Duration::from_secs(9));
        assert!(hint <= Duration::from_secs(11));

        let past = FetchError::RateLimited {
            resource: "core".to_string(),
            reset_at: Utc::now() - chrono::Duration::seconds(10),
        };
        assert_eq!(past.retry_after(), Some(RESET_SLACK));
    }
}
