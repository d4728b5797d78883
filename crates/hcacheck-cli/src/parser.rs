//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Health checker for InfiniBand and RoCE adapters.
#[derive(Parser)]
#[command(name = "hcacheck")]
#[command(about = "Check InfiniBand/RoCE adapters against a cluster specification")]
#[command(version)]
pub struct Cli {
    /// Settings file (YAML)
    #[arg(short = 'c', long = "config", global = true, env = "HCACHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "hcacheck",
            "--verbose",
            "--config",
            "/etc/hcacheck.yaml",
            "collect",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/hcacheck.yaml")));
        assert!(matches!(cli.command, Some(Commands::Collect)));
    }

    #[test]
    fn test_check_flags() {
        let cli = Cli::parse_from(["hcacheck", "check", "--watch", "--file", "hpc_spec.yaml"]);
        match cli.command {
            Some(Commands::Check { file, watch, json }) => {
                assert_eq!(file.as_deref(), Some("hpc_spec.yaml"));
                assert!(watch);
                assert!(!json);
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_version_takes_two_positionals() {
        let cli = Cli::parse_from(["hcacheck", "version", ">=28.39.1002", "28.39.2048", "--firmware"]);
        match cli.command {
            Some(Commands::Version {
                constraint,
                actual,
                firmware,
            }) => {
                assert_eq!(constraint, ">=28.39.1002");
                assert_eq!(actual, "28.39.2048");
                assert!(firmware);
            }
            _ => panic!("expected version"),
        }
    }
}
