//! `hcacheck gateway`: resolve one net device's egress gateway.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::describe_gateway;

pub async fn execute(ctx: &CliContext, netdev: &str) -> Result<()> {
    let resolution = ctx
        .collector
        .gateways()
        .resolve(netdev)
        .await
        .map_err(|e| CliError::Core(e.to_string()))?;
    println!("{netdev}: {}", describe_gateway(&resolution));
    Ok(())
}
