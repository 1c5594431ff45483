//! Audit logging for ingestion runs.
//!
//! All events are emitted via `tracing` with a dedicated target so they can be
//! filtered and formatted (e.g. JSON) separately from operational logs.

use tracing::{error, info};

pub const AUDIT_TARGET: &str = "repopulse::audit";

/// Log the start of an ingestion run.
pub fn run_started(run_id: &str, language: Option<&str>, top_n: usize) {
    info!(
        target: AUDIT_TARGET,
        event = "run_started",
        run_id = %run_id,
        language = %language.unwrap_or("*"),
        top_n = top_n,
    );
}

/// Log a successful table flush.
pub fn table_flushed(table: &str, rows: usize) {
    info!(
        target: AUDIT_TARGET,
        event = "table_flushed",
        table = %table,
        rows = rows,
    );
}

/// Log a completed run.
pub fn run_finished(run_id: &str, repositories: usize, detail_failures: usize) {
    info!(
        target: AUDIT_TARGET,
        event = "run_finished",
        result = "ok",
        run_id = %run_id,
        repositories = repositories,
        detail_failures = detail_failures,
    );
}

/// Log an aborted run.
pub fn run_failed(run_id: &str, reason: &str) {
    error!(
        target: AUDIT_TARGET,
        event = "run_failed",
        result = "aborted",
        run_id = %run_id,
        reason = %reason,
    );
}
