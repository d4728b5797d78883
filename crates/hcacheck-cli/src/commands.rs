//! Available subcommands.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the specification for this host and print it as YAML
    Spec {
        /// Spec file name, local path or http(s) URL
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Collect the adapter snapshot and print it as JSON
    Collect,

    /// Check adapters against the specification
    Check {
        /// Spec file name, local path or http(s) URL
        #[arg(short, long)]
        file: Option<String>,
        /// Repeat every poll interval until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the egress gateway of a net device
    Gateway {
        /// Net device name, e.g. "eth2" or "bond0"
        netdev: String,
    },

    /// Evaluate a version constraint against an actual version
    Version {
        /// Constraint such as ">=MLNX_OFED_LINUX-23.10-1.1.9.0"
        constraint: String,
        /// Version to test, e.g. "MLNX_OFED_LINUX-23.10-2.1.3.1"
        actual: String,
        /// Compare as a dotted firmware version
        #[arg(long)]
        firmware: bool,
    },

    /// Show resolved directories, roots and URLs
    Paths,
}
