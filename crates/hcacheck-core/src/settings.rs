//! Agent settings and validation.
//!
//! All fields are optional so a partial YAML file or a handful of
//! environment variables can configure the agent. `effective_*` accessors
//! supply the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default canonical directory for downloaded and bundled spec files.
pub const DEFAULT_SPEC_DIR: &str = "/var/hcacheck/config";

/// Default timeout for remote spec store requests.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default timeout for one diagnostic tool invocation.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Default freshness window for gateway lookups.
pub const DEFAULT_GATEWAY_TTL_SECS: u64 = 300;

/// Default freshness window for reachability probes.
pub const DEFAULT_CONNECTIVITY_TTL_SECS: u64 = 30;

/// Default interval between passes in watch mode.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys";
pub const DEFAULT_PROCFS_ROOT: &str = "/proc";

/// Environment variable names honoured by [`Settings::apply_env`].
pub mod env {
    pub const SPEC_DIR: &str = "HCACHECK_SPEC_DIR";
    pub const SPEC_URL: &str = "HCACHECK_SPEC_URL";
    pub const SYSFS_ROOT: &str = "HCACHECK_SYSFS_ROOT";
    pub const PROCFS_ROOT: &str = "HCACHECK_PROCFS_ROOT";
    pub const NODE_NAME: &str = "NODE_NAME";
}

/// Agent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Canonical directory for production spec files.
    pub spec_dir: Option<String>,

    /// Development default spec directory (every `*_spec.yaml` inside is merged).
    pub dev_spec_dir: Option<String>,

    /// Base URL of the remote spec store.
    pub spec_url: Option<String>,

    /// Host identity used to derive the cluster name.
    pub node_name: Option<String>,

    pub http_timeout_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
    pub gateway_ttl_secs: Option<u64>,
    pub connectivity_ttl_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,

    /// Root of the sysfs tree (overridable for tests and containers).
    pub sysfs_root: Option<String>,

    /// Root of the procfs tree.
    pub procfs_root: Option<String>,

    /// Rewrite PCIe Max-Read-Request to 4096 when it differs.
    pub fix_pcie_mrr: Option<bool>,
}

const fn secs_or(value: Option<u64>, default: u64) -> Duration {
    match value {
        Some(secs) => Duration::from_secs(secs),
        None => Duration::from_secs(default),
    }
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            spec_dir: None,
            dev_spec_dir: None,
            spec_url: None,
            node_name: None,
            http_timeout_secs: Some(DEFAULT_HTTP_TIMEOUT_SECS),
            command_timeout_secs: Some(DEFAULT_COMMAND_TIMEOUT_SECS),
            gateway_ttl_secs: Some(DEFAULT_GATEWAY_TTL_SECS),
            connectivity_ttl_secs: Some(DEFAULT_CONNECTIVITY_TTL_SECS),
            poll_interval_secs: Some(DEFAULT_POLL_INTERVAL_SECS),
            sysfs_root: None,
            procfs_root: None,
            fix_pcie_mrr: Some(true),
        }
    }

    /// Load settings from a YAML file. Missing fields keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut loaded: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&text).map_err(|e| SettingsError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        };
        loaded.fill_defaults(&Self::with_defaults());
        Ok(loaded)
    }

    /// Fill every unset field from `defaults`.
    pub fn fill_defaults(&mut self, defaults: &Self) {
        macro_rules! fill {
            ($($field:ident),* $(,)?) => {
                $(if self.$field.is_none() {
                    self.$field.clone_from(&defaults.$field);
                })*
            };
        }
        fill!(
            spec_dir,
            dev_spec_dir,
            spec_url,
            node_name,
            http_timeout_secs,
            command_timeout_secs,
            gateway_ttl_secs,
            connectivity_ttl_secs,
            poll_interval_secs,
            sysfs_root,
            procfs_root,
            fix_pcie_mrr,
        );
    }

    /// Override fields from environment variables.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = non_empty(env::SPEC_DIR) {
            self.spec_dir = Some(dir);
        }
        if let Some(url) = non_empty(env::SPEC_URL) {
            self.spec_url = Some(url);
        }
        if let Some(root) = non_empty(env::SYSFS_ROOT) {
            self.sysfs_root = Some(root);
        }
        if let Some(root) = non_empty(env::PROCFS_ROOT) {
            self.procfs_root = Some(root);
        }
        if let Some(node) = non_empty(env::NODE_NAME) {
            self.node_name = Some(node);
        }
    }

    pub const fn effective_http_timeout(&self) -> Duration {
        secs_or(self.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS)
    }

    pub const fn effective_command_timeout(&self) -> Duration {
        secs_or(self.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS)
    }

    pub const fn effective_gateway_ttl(&self) -> Duration {
        secs_or(self.gateway_ttl_secs, DEFAULT_GATEWAY_TTL_SECS)
    }

    pub const fn effective_connectivity_ttl(&self) -> Duration {
        secs_or(self.connectivity_ttl_secs, DEFAULT_CONNECTIVITY_TTL_SECS)
    }

    pub const fn effective_poll_interval(&self) -> Duration {
        secs_or(self.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS)
    }

    pub fn effective_sysfs_root(&self) -> &str {
        self.sysfs_root.as_deref().unwrap_or(DEFAULT_SYSFS_ROOT)
    }

    pub fn effective_procfs_root(&self) -> &str {
        self.procfs_root.as_deref().unwrap_or(DEFAULT_PROCFS_ROOT)
    }

    pub fn effective_fix_pcie_mrr(&self) -> bool {
        self.fix_pcie_mrr.unwrap_or(true)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse settings file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Spec store URL must start with http:// or https://, got '{0}'")]
    InvalidSpecUrl(String),

    #[error("{field} cannot be empty")]
    EmptyPath { field: &'static str },
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    let durations = [
        ("http_timeout_secs", settings.http_timeout_secs),
        ("command_timeout_secs", settings.command_timeout_secs),
        ("gateway_ttl_secs", settings.gateway_ttl_secs),
        ("connectivity_ttl_secs", settings.connectivity_ttl_secs),
        ("poll_interval_secs", settings.poll_interval_secs),
    ];
    for (field, value) in durations {
        if value == Some(0) {
            return Err(SettingsError::ZeroDuration { field });
        }
    }

    if let Some(url) = &settings.spec_url {
        if !crate::ports::is_remote_location(url) {
            return Err(SettingsError::InvalidSpecUrl(url.clone()));
        }
    }

    let paths = [
        ("spec_dir", &settings.spec_dir),
        ("dev_spec_dir", &settings.dev_spec_dir),
        ("sysfs_root", &settings.sysfs_root),
        ("procfs_root", &settings.procfs_root),
    ];
    for (field, value) in paths {
        if value.as_ref().is_some_and(|p| p.trim().is_empty()) {
            return Err(SettingsError::EmptyPath { field });
        }
    }

    Ok(())
}
