//! CLI entry point.
//!
//! Settings are loaded and the context is bootstrapped here; handlers do the
//! rest. Exit status: 0 when healthy, 1 when a check or constraint fails, a
//! sysexits code when the command itself could not run.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use hcacheck_cli::error::exit_code_for;
use hcacheck_cli::handlers::check::CheckArgs;
use hcacheck_cli::{Cli, CliConfig, Commands, bootstrap, handlers};
use hcacheck_core::CheckStatus;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let config = CliConfig::new(cli.config);
    let settings = config.load_settings()?;

    // Commands that never touch the host's adapters
    match &command {
        Commands::Paths => {
            handlers::paths::execute(&settings, config.settings_file.as_deref())?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Version {
            constraint,
            actual,
            firmware,
        } => {
            let ok = handlers::version::execute(constraint, actual, *firmware)?;
            return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
        }
        _ => {}
    }

    let ctx = bootstrap(settings)?;
    let outcome = match command {
        Commands::Spec { file } => handlers::spec::execute(&ctx, file.as_deref())
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Collect => handlers::collect::execute(&ctx)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Check { file, watch, json } => {
            let args = CheckArgs {
                file: file.as_deref(),
                watch,
                json,
            };
            handlers::check::execute(&ctx, args)
                .await
                .map(|status| match status {
                    CheckStatus::Abnormal => ExitCode::FAILURE,
                    CheckStatus::Normal | CheckStatus::Skipped => ExitCode::SUCCESS,
                })
        }
        Commands::Gateway { netdev } => handlers::gateway::execute(&ctx, &netdev)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Paths | Commands::Version { .. } => Ok(ExitCode::SUCCESS),
    };
    ctx.close().await;
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap reads `env` defaults
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
