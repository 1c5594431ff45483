//! Prometheus metrics for API traffic and collection

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec,
    Counter, CounterVec, GaugeVec, HistogramVec,
};

// ── API traffic ──────────────────────────────────────────────────────────────

pub static HTTP_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "repopulse_http_requests_total",
        "GitHub API requests by resource and outcome",
        &["resource", "outcome"]
    )
    .unwrap()
});

pub static HTTP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "repopulse_http_request_duration_seconds",
        "GitHub API request latency, limiter waits excluded",
        &["resource"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0]
    )
    .unwrap()
});

pub static QUOTA_REMAINING: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "repopulse_quota_remaining",
        "Remaining API quota as last reported by the server",
        &["resource"]
    )
    .unwrap()
});

pub static RATE_LIMIT_WAITS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "repopulse_rate_limit_waits_total",
        "Requests that waited for a quota reset",
        &["resource"]
    )
    .unwrap()
});

pub static RATE_LIMIT_WAIT_SECONDS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "repopulse_rate_limit_wait_seconds_total",
        "Time spent waiting for quota resets"
    )
    .unwrap()
});

pub static CACHE_LOOKUPS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "repopulse_api_cache_lookups_total",
        "Response cache lookups by result",
        &["result"]
    )
    .unwrap()
});

// ── Collection ───────────────────────────────────────────────────────────────

pub static REPOSITORIES_COLLECTED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "repopulse_repositories_collected_total",
        "Repositories returned by the listing phase"
    )
    .unwrap()
});

pub static DETAIL_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "repopulse_detail_failures_total",
        "Detail fetches skipped after retries",
        &["enricher"]
    )
    .unwrap()
});
