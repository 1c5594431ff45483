//! repopulse command-line interface
//!
//! - ingest: collect the most-starred GitHub repositories and write them to
//!   ClickHouse
//! - views: hourly view-delta report for a campaign

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;
mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(name = "repopulse")]
#[command(about = "repopulse - GitHub repository statistics ingestion", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (TOML); defaults to ./repopulse.toml when present
    #[arg(short, long, global = true, env = "REPOPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect repositories and their details, then write them to the store
    Ingest(commands::ingest::IngestArgs),

    /// Report today's hourly view increases for a campaign
    Views(commands::views::ViewsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args, settings).await,
        Commands::Views(args) => commands::views::run(args, settings).await,
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingest_flags() {
        let cli = Cli::parse_from([
            "repopulse", "--verbose", "ingest", "--language", "Rust", "-n", "50", "--dry-run",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.language.as_deref(), Some("Rust"));
                assert_eq!(args.top_n, Some(50));
                assert!(args.dry_run);
            }
            Commands::Views(_) => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_views_requires_campaign_id() {
        assert!(Cli::try_parse_from(["repopulse", "views"]).is_err());
        let cli = Cli::try_parse_from(["repopulse", "views", "--campaign-id", "7", "--json"]).unwrap();
        match cli.command {
            Commands::Views(args) => {
                assert_eq!(args.campaign_id, 7);
                assert!(args.json);
            }
            Commands::Ingest(_) => panic!("expected views"),
        }
    }
}
