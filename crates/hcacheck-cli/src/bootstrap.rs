//! CLI bootstrap - the composition root.
//!
//! This module is the only place where concrete adapters are wired together:
//! - settings from file, environment and defaults
//! - the tokio process runner (via hcacheck-runtime)
//! - the remote spec store (via hcacheck-remote)
//! - the spec resolver, snapshot collector and connectivity prober

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hcacheck_core::paths::{default_settings_file, host_identity, resolve_dev_spec_dir};
use hcacheck_core::ports::{CommandRunner, ReachabilityProbe, SpecStore};
use hcacheck_core::{CheckerOptions, Settings, SpecResolver, resolve_spec_dir, validate_settings};
use hcacheck_remote::{DefaultSpecStore, RemoteConfig};
use hcacheck_runtime::{
    ConnectivityProber, HostPaths, SnapshotCollector, SysfsInventory, TokioCommandRunner,
    has_nvidia_gpu,
};
use tracing::debug;

use crate::error::CliError;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Explicit settings file from `--config`.
    pub settings_file: Option<PathBuf>,
}

impl CliConfig {
    pub fn new(settings_file: Option<PathBuf>) -> Self {
        Self { settings_file }
    }

    /// Load settings from the process environment.
    pub fn load_settings(&self) -> Result<Settings, CliError> {
        let default_file = default_settings_file().ok();
        self.load_settings_with(default_file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Load settings: file (explicit, else `default_file` when it exists),
    /// then environment overrides, then validation.
    pub fn load_settings_with<F>(
        &self,
        default_file: Option<&Path>,
        lookup: F,
    ) -> Result<Settings, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match &self.settings_file {
            Some(path) => Some(path.as_path()),
            None => default_file.filter(|p| p.is_file()),
        };

        let mut settings = match file {
            Some(path) => {
                debug!(path = %path.display(), "loading settings file");
                Settings::from_yaml_file(path).map_err(|e| CliError::Config(e.to_string()))?
            }
            None => Settings::with_defaults(),
        };
        settings.apply_env(lookup);
        validate_settings(&settings).map_err(|e| CliError::Config(e.to_string()))?;
        Ok(settings)
    }
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    pub settings: Settings,
    pub runner: Arc<dyn CommandRunner>,
    pub resolver: SpecResolver,
    pub collector: SnapshotCollector,
    pub prober: Arc<ConnectivityProber>,
    /// Node name used to pick the cluster spec.
    pub host_identity: String,
}

impl CliContext {
    /// Check options for this host: peermem is required when a GPU is present.
    pub fn checker_options(&self) -> CheckerOptions {
        CheckerOptions {
            require_peermem: has_nvidia_gpu(self.collector.paths()),
            probe: Some(Arc::clone(&self.prober) as Arc<dyn ReachabilityProbe>),
        }
    }

    /// Drop cached gateways and probe results.
    pub async fn close(&self) {
        self.collector.close().await;
        self.prober.close().await;
    }
}

/// Bootstrap the CLI application from loaded settings.
pub fn bootstrap(settings: Settings) -> Result<CliContext, CliError> {
    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner);
    bootstrap_with(settings, runner)
}

/// Bootstrap with a custom command runner (for testing).
pub fn bootstrap_with(
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
) -> Result<CliContext, CliError> {
    let store: Arc<dyn SpecStore> = Arc::new(
        DefaultSpecStore::from_config(&RemoteConfig::from_settings(&settings))
            .map_err(|e| CliError::Config(e.to_string()))?,
    );

    let paths = HostPaths::from_settings(&settings);
    let spec_dir = resolve_spec_dir(&settings);
    debug!(
        spec_dir = %spec_dir.path.display(),
        source = %spec_dir.source,
        "spec directory resolved"
    );
    let resolver = SpecResolver::new(
        spec_dir.path,
        resolve_dev_spec_dir(&settings),
        store,
        Arc::new(SysfsInventory::new(paths)),
    );

    let collector = SnapshotCollector::from_settings(&settings, Arc::clone(&runner));
    let prober = Arc::new(ConnectivityProber::with_ttl(
        Arc::clone(&runner),
        settings.effective_connectivity_ttl(),
    ));

    Ok(CliContext {
        host_identity: host_identity(&settings),
        settings,
        runner,
        resolver,
        collector,
        prober,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = CliConfig::default()
            .load_settings_with(None, no_env)
            .unwrap();
        assert_eq!(settings, Settings::with_defaults());
    }

    #[test]
    fn test_explicit_file_then_env() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.yaml");
        std::fs::write(&file, "spec_dir: /opt/specs\npoll_interval_secs: 15\n").unwrap();
        let env: HashMap<&str, &str> = [("HCACHECK_SPEC_DIR", "/srv/specs")].into();

        let settings = CliConfig::new(Some(file))
            .load_settings_with(None, |k| env.get(k).map(ToString::to_string))
            .unwrap();
        assert_eq!(settings.spec_dir.as_deref(), Some("/srv/specs"));
        assert_eq!(settings.poll_interval_secs, Some(15));
    }

    #[test]
    fn test_missing_explicit_file_is_config_error() {
        let err = CliConfig::new(Some(PathBuf::from("/nonexistent/hcacheck.yaml")))
            .load_settings_with(None, no_env)
            .unwrap_err();
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn test_absent_default_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let settings = CliConfig::default()
            .load_settings_with(Some(&dir.path().join("config.yaml")), no_env)
            .unwrap();
        assert_eq!(settings.poll_interval_secs, Settings::with_defaults().poll_interval_secs);
    }

    #[test]
    fn test_invalid_spec_url_is_rejected() {
        let env: HashMap<&str, &str> = [("HCACHECK_SPEC_URL", "ftp://specs")].into();
        let err = CliConfig::default()
            .load_settings_with(None, |k| env.get(k).map(ToString::to_string))
            .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_uses_configured_roots() {
        let host = TempDir::new().unwrap();
        let settings = Settings {
            sysfs_root: Some(host.path().join("sys").display().to_string()),
            procfs_root: Some(host.path().join("proc").display().to_string()),
            node_name: Some("hpc-017".to_string()),
            ..Settings::with_defaults()
        };
        let ctx = bootstrap(settings).unwrap();
        assert_eq!(ctx.host_identity, "hpc-017");
        assert_eq!(ctx.collector.paths().sysfs_root(), host.path().join("sys"));
        assert!(!ctx.checker_options().require_peermem);
        ctx.close().await;
    }
}
