//! `hcacheck collect`: print the adapter snapshot as JSON.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::error::CliError;

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let snapshot = ctx.collector.collect().await.map_err(CliError::from)?;
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| CliError::Core(e.to_string()))?;
    println!("{json}");
    Ok(())
}
