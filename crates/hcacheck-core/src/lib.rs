#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]
#![deny(unsafe_code)]

pub mod cache;
pub mod checks;
pub mod domain;
pub mod paths;
pub mod ports;
pub mod services;
pub mod settings;
pub mod utils;

// Re-export commonly used types for convenience
pub use cache::{CacheEntry, CacheError, TtlCache};
pub use checks::{Checker, CheckerOptions, default_checkers, run_checks};
pub use domain::{
    AdapterIdentity, AdapterSpec, AdapterState, CheckLevel, CheckReport, CheckResult,
    CheckStatus, ClusterSpec, CounterMap, GatewayResolution, HardwareSpec, InfinibandSnapshot,
    LinkLayer, NicRole, NoGatewayReason, PciFunction, PerfSpec, ResolvedSpec, SoftwareDeps,
    SoftwareState, SpecDocument,
};
pub use ports::{
    AdapterInventory, CommandOutput, CommandRequest, CommandRunner, CoreError, InventoryError,
    LinkInspector, ProcessError, Reachability, ReachabilityProbe, RouteSource, RoutingError,
    SpecStore, SpecStoreError,
};
pub use services::{GatewayError, GatewayResolver, SpecError, SpecResolver};
pub use settings::{Settings, SettingsError, validate_settings};

// Re-export path utilities
pub use paths::{
    PathError, SpecDirResolution, SpecDirSource, cluster_name, ensure_directory, host_identity,
    resolve_spec_dir,
};
pub use utils::{VersionError, firmware_satisfies, satisfies};

#[cfg(test)]
use tokio_test as _;
