//! `hcacheck spec`: print the specification bound to this host.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::error::CliError;

pub async fn execute(ctx: &CliContext, file: Option<&str>) -> Result<()> {
    let spec = ctx
        .resolver
        .resolve(file, &ctx.host_identity)
        .await
        .map_err(|e| CliError::Spec(e.to_string()))?;
    let yaml = serde_yaml::to_string(&spec).map_err(|e| CliError::Core(e.to_string()))?;
    print!("{yaml}");
    Ok(())
}
