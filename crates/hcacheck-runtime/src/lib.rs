#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]
#![deny(unsafe_code)]

pub mod collector;
pub mod connectivity;
pub mod counters;
pub mod error;
pub mod hardware;
pub mod host;
pub mod inventory;
pub mod netdev;
pub mod process;
pub mod routing;
pub mod software;

// Re-export the collectors
pub use collector::SnapshotCollector;
pub use counters::{CounterCollector, CounterFamily};
pub use hardware::HardwareCollector;
pub use software::SoftwareCollector;

// Re-export port implementations
pub use connectivity::{ConnectivityCache, ConnectivityProber, ProbeError};
pub use inventory::{SysfsInventory, has_nvidia_gpu, scan_pci_adapters};
pub use netdev::SysfsLinkInspector;
pub use process::TokioCommandRunner;
pub use routing::NetlinkRouteSource;

pub use error::CollectError;
pub use host::HostPaths;

#[cfg(test)]
use tokio_test as _;
