//! `hcacheck check`: run every check item once, or on an interval.

use std::sync::Arc;

use anyhow::Result;
use hcacheck_core::{CheckReport, CheckStatus, default_checkers, run_checks};
use tracing::{error, info};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_report;

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckArgs<'a> {
    pub file: Option<&'a str>,
    pub watch: bool,
    pub json: bool,
}

/// One pass: resolve the spec, collect a snapshot, run the checks.
pub async fn run_once(ctx: &CliContext, file: Option<&str>) -> Result<CheckReport, CliError> {
    let spec = ctx
        .resolver
        .resolve(file, &ctx.host_identity)
        .await
        .map_err(|e| CliError::Spec(e.to_string()))?;
    let snapshot = ctx.collector.collect().await?;
    let checkers = default_checkers(ctx.checker_options());
    Ok(run_checks(&checkers, Arc::new(snapshot), Arc::new(spec)).await)
}

fn emit(report: &CheckReport, json: bool) -> Result<()> {
    if json {
        let text =
            serde_json::to_string_pretty(report).map_err(|e| CliError::Core(e.to_string()))?;
        println!("{text}");
    } else {
        print_report(report);
    }
    Ok(())
}

/// Returns the status of the last completed pass.
pub async fn execute(ctx: &CliContext, args: CheckArgs<'_>) -> Result<CheckStatus> {
    if !args.watch {
        let report = run_once(ctx, args.file).await?;
        emit(&report, args.json)?;
        return Ok(report.status());
    }

    let interval = ctx.settings.effective_poll_interval();
    info!(interval_secs = interval.as_secs(), "watching adapters");
    let mut status = CheckStatus::Normal;
    loop {
        // A failed pass is logged and retried on the next tick.
        match run_once(ctx, args.file).await {
            Ok(report) => {
                status = report.status();
                emit(&report, args.json)?;
            }
            Err(e) => error!(error = %e, "check pass failed"),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                break;
            }
            () = tokio::time::sleep(interval) => {}
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcacheck_core::Settings;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_spec_fails_before_collection() {
        let specs = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let settings = Settings {
            spec_dir: Some(specs.path().display().to_string()),
            dev_spec_dir: Some(specs.path().display().to_string()),
            sysfs_root: Some(host.path().display().to_string()),
            node_name: Some("hpc-001".to_string()),
            ..Settings::with_defaults()
        };
        let ctx = crate::bootstrap(settings).unwrap();

        let err = run_once(&ctx, None).await.unwrap_err();
        assert!(matches!(err, CliError::Spec(ref msg) if msg.contains("hpc_spec.yaml")));
        ctx.close().await;
    }
}
