//! Spec directory resolution and host identity helpers.
//!
//! Resolution order for the canonical spec directory:
//! 1. `spec_dir` setting (usually from `HCACHECK_SPEC_DIR`)
//! 2. [`DEFAULT_SPEC_DIR`] when it exists on this host
//! 3. The `config/` directory bundled with this crate (source checkouts)

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::domain::DEFAULT_CLUSTER;
use crate::settings::{DEFAULT_SPEC_DIR, Settings};

/// Suffix shared by every spec file name.
pub const SPEC_FILE_SUFFIX: &str = "_spec.yaml";

/// Bundled default spec file name inside the canonical directory.
pub const DEFAULT_SPEC_FILE: &str = "default_spec.yaml";

static CLUSTER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z]+)-?\d*").ok());

/// Errors that can occur during path resolution.
#[derive(Debug, Clone, Error)]
pub enum PathError {
    /// Could not determine the user's configuration directory.
    #[error("Cannot determine user config directory")]
    NoConfigDir,

    /// A path was expected to be a directory but was not.
    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },
}

/// Where the canonical spec directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecDirSource {
    Setting,
    SystemDefault,
    Bundled,
}

impl fmt::Display for SpecDirSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setting => "setting",
            Self::SystemDefault => "system default",
            Self::Bundled => "bundled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDirResolution {
    pub path: PathBuf,
    pub source: SpecDirSource,
}

/// Directory of spec files shipped with the crate sources.
pub fn bundled_spec_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
}

/// Resolve the canonical spec directory.
pub fn resolve_spec_dir(settings: &Settings) -> SpecDirResolution {
    if let Some(dir) = settings.spec_dir.as_deref() {
        return SpecDirResolution {
            path: PathBuf::from(dir),
            source: SpecDirSource::Setting,
        };
    }
    let system = PathBuf::from(DEFAULT_SPEC_DIR);
    if system.is_dir() {
        return SpecDirResolution {
            path: system,
            source: SpecDirSource::SystemDefault,
        };
    }
    SpecDirResolution {
        path: bundled_spec_dir(),
        source: SpecDirSource::Bundled,
    }
}

/// Development default directory: the setting, else the bundled directory.
pub fn resolve_dev_spec_dir(settings: &Settings) -> PathBuf {
    settings
        .dev_spec_dir
        .as_deref()
        .map_or_else(bundled_spec_dir, PathBuf::from)
}

/// Default location of the optional settings file.
pub fn default_settings_file() -> Result<PathBuf, PathError> {
    dirs::config_dir()
        .map(|dir| dir.join("hcacheck").join("config.yaml"))
        .ok_or(PathError::NoConfigDir)
}

/// Create `dir` if needed and make sure it is a directory.
pub fn ensure_directory(dir: &Path) -> Result<(), PathError> {
    if dir.exists() {
        if dir.is_dir() {
            return Ok(());
        }
        return Err(PathError::NotADirectory(dir.to_path_buf()));
    }
    std::fs::create_dir_all(dir).map_err(|e| PathError::CreateFailed {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Derive the cluster name from a host identity such as `gpua100-017`.
///
/// The leading alphabetic run is the cluster; `default` when there is none.
pub fn cluster_name(node_name: &str) -> String {
    CLUSTER_PATTERN
        .as_ref()
        .and_then(|re| re.captures(node_name.trim()))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| DEFAULT_CLUSTER.to_string(), |m| m.as_str().to_string())
}

/// Spec file name for a cluster, e.g. `hpc_spec.yaml`.
pub fn spec_file_name(cluster: &str) -> String {
    format!("{cluster}{SPEC_FILE_SUFFIX}")
}

/// Host identity: the configured node name, else the kernel hostname.
pub fn host_identity(settings: &Settings) -> String {
    if let Some(node) = settings.node_name.as_deref() {
        return node.to_string();
    }
    let hostname = Path::new(settings.effective_procfs_root()).join("sys/kernel/hostname");
    std::fs::read_to_string(hostname)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_name_from_node_name() {
        assert_eq!(cluster_name("hpc-017"), "hpc");
        assert_eq!(cluster_name("gpu12"), "gpu");
        assert_eq!(cluster_name("taiji"), "taiji");
        assert_eq!(cluster_name("123-node"), "default");
        assert_eq!(cluster_name(""), "default");
    }

    #[test]
    fn test_spec_file_name() {
        assert_eq!(spec_file_name("hpc"), "hpc_spec.yaml");
        assert_eq!(spec_file_name(DEFAULT_CLUSTER), DEFAULT_SPEC_FILE);
    }

    #[test]
    fn test_setting_wins_spec_dir_resolution() {
        let settings = Settings {
            spec_dir: Some("/opt/hcacheck".to_string()),
            ..Settings::with_defaults()
        };
        let resolved = resolve_spec_dir(&settings);
        assert_eq!(resolved.path, PathBuf::from("/opt/hcacheck"));
        assert_eq!(resolved.source, SpecDirSource::Setting);
    }

    #[test]
    fn test_bundled_dir_contains_default_spec() {
        assert!(bundled_spec_dir().join(DEFAULT_SPEC_FILE).is_file());
        assert_eq!(resolve_dev_spec_dir(&Settings::default()), bundled_spec_dir());
    }

    #[test]
    fn test_host_identity_prefers_setting() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/kernel")).unwrap();
        std::fs::write(dir.path().join("sys/kernel/hostname"), "gpu-007\n").unwrap();

        let mut settings = Settings {
            procfs_root: Some(dir.path().display().to_string()),
            ..Settings::default()
        };
        assert_eq!(host_identity(&settings), "gpu-007");

        settings.node_name = Some("hpc-001".to_string());
        assert_eq!(host_identity(&settings), "hpc-001");
    }

    #[test]
    fn test_ensure_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            ensure_directory(&file),
            Err(PathError::NotADirectory(_))
        ));
    }
}
