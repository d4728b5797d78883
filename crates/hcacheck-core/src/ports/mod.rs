//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No process spawning, sysfs paths or HTTP types in any signature
//! - Intent-based methods (`present_board_ids`, `policy_rules`), not raw I/O
//! - Every port error is `Clone` so it can be cached next to a value

pub mod command_runner;
pub mod inventory;
pub mod reachability;
pub mod routing;
pub mod spec_store;

use thiserror::Error;

pub use command_runner::{CommandOutput, CommandRequest, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
pub use inventory::{AdapterInventory, InventoryError, StaticInventory};
pub use reachability::{ProbeMethod, Reachability, ReachabilityProbe};
pub use routing::{Ipv4Cidr, LinkInspector, PolicyRule, RouteEntry, RouteSource, RoutingError};
pub use spec_store::{NoopSpecStore, SpecStore, SpecStoreError, is_remote_location};

/// Domain-specific errors for external command execution.
///
/// This error type abstracts away process management implementation details
/// and provides a clean interface for collectors to handle tool failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// The program could not be started (not installed, no permission).
    #[error("Failed to start '{command}': {reason}")]
    StartFailed { command: String, reason: String },

    /// The program did not finish in time and was killed.
    #[error("'{command}' timed out after {timeout_ms} ms")]
    TimedOut { command: String, timeout_ms: u128 },

    /// The program exited unsuccessfully.
    #[error("'{command}' exited with status {status:?}: {stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// Output could not be interpreted.
    #[error("Unexpected output from '{command}': {reason}")]
    UnexpectedOutput { command: String, reason: String },
}

/// Core error type for semantic domain errors.
///
/// This is the canonical error type used across the core domain.
/// Adapters should map this to their own error types (CLI exit codes).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Specification could not be resolved.
    #[error(transparent)]
    Spec(#[from] crate::services::SpecError),

    /// Gateway resolution failed.
    #[error(transparent)]
    Gateway(#[from] crate::services::GatewayError),

    /// External command failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Settings validation error.
    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    /// Path resolution error.
    #[error(transparent)]
    Path(#[from] crate::paths::PathError),

    /// Malformed version string or constraint.
    #[error(transparent)]
    Version(#[from] crate::utils::VersionError),

    /// Validation error (invalid input).
    #[error("Validation error: {0}")]
    Validation(String),
}
