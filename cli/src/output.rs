//! Terminal rendering for command results

use colored::Colorize;
use repopulse_collector::RunSummary;
use repopulse_shared::types::records::RepositoryRecord;
use repopulse_shared::types::views::PhraseViewDeltas;

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a finished run, listing any repository whose details were skipped.
pub fn print_run_summary(summary: &RunSummary) {
    success(&format!(
        "Run {} finished in {:.1}s",
        summary.run_id, summary.elapsed_secs
    ));
    println!("  repositories:        {}", summary.repositories);
    println!("  author commit rows:  {}", summary.author_commits);
    println!("  language positions:  {}", summary.language_positions);

    if summary.detail_failures.is_empty() {
        return;
    }
    warning(&format!(
        "{} detail fetch(es) failed; those rows were skipped",
        summary.detail_failures.len()
    ));
    for failure in &summary.detail_failures {
        println!(
            "  {} [{}]: {}",
            failure.repository.bold(),
            failure.enricher,
            failure.error
        );
    }
}

/// Repositories as the store would hold them after merging, for dry runs.
pub fn print_repositories(rows: &[RepositoryRecord]) {
    for row in rows {
        println!(
            "  {:<40} {:>8} stars {:>7} forks  {}",
            format!("{}/{}", row.owner, row.name),
            row.stars,
            row.forks,
            if row.language.is_empty() { "-" } else { row.language.as_str() }
        );
    }
}

/// One line per phrase: `phrase: 14h +8, 12h +5`.
pub fn render_view_deltas(report: &[PhraseViewDeltas]) -> String {
    report
        .iter()
        .map(|row| {
            let deltas = if row.deltas.is_empty() {
                "no increase".to_string()
            } else {
                row.deltas
                    .iter()
                    .map(|d| format!("{:02}h +{}", d.hour, d.diff))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("{}: {}", row.phrase, deltas)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
