//! Views command implementation

use anyhow::{Context, Result};
use clap::Args;
use repopulse_warehouse::storage::clickhouse::ClickHouseStore;
use repopulse_warehouse::BatchStore;

use crate::output;
use crate::settings::Settings;

#[derive(Args, Debug)]
pub struct ViewsArgs {
    /// Campaign whose phrases are reported
    #[arg(long)]
    pub campaign_id: i64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ViewsArgs, settings: Settings) -> Result<()> {
    settings.clickhouse.validate().context("[clickhouse]")?;

    let store = ClickHouseStore::connect(&settings.clickhouse)
        .await
        .context("Failed to connect to ClickHouse")?;
    let report = store
        .view_deltas(args.campaign_id)
        .await
        .context("View-delta query failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_empty() {
        output::info(&format!(
            "No views recorded today for campaign {}",
            args.campaign_id
        ));
        return Ok(());
    }
    println!("{}", output::render_view_deltas(&report));
    Ok(())
}
