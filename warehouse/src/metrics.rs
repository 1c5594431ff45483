//! Prometheus metrics for store writes
//!
//! Everything registers with the default registry, so [`encode_metrics`]
//! also renders the collector's fetch metrics.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

// ── Flush metrics ────────────────────────────────────────────────────────────

pub static FLUSH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "repopulse_flush_total",
        "Table flush attempts",
        &["table", "status"]
    )
    .unwrap()
});

pub static FLUSH_ROWS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "repopulse_flush_rows_total",
        "Rows written to the analytical store",
        &["table"]
    )
    .unwrap()
});

pub static FLUSH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "repopulse_flush_duration_seconds",
        "Table flush latency, retries included",
        &["table"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap()
});

pub static PENDING_ROWS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "repopulse_pending_rows",
        "Rows staged in the batch writer and not yet flushed"
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
