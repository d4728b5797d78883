//! Host filesystem layout.
//!
//! Every sysfs/procfs path goes through [`HostPaths`] so tests can point the
//! collectors at a fake tree under a temporary directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hcacheck_core::Settings;
use tracing::debug;

/// Roots of the sysfs and procfs trees to read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    sysfs_root: PathBuf,
    procfs_root: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self::new("/sys", "/proc")
    }
}

impl HostPaths {
    pub fn new(sysfs_root: impl Into<PathBuf>, procfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            procfs_root: procfs_root.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.effective_sysfs_root(),
            settings.effective_procfs_root(),
        )
    }

    pub fn sysfs_root(&self) -> &Path {
        &self.sysfs_root
    }

    /// `/sys/class/infiniband`
    pub fn infiniband_class(&self) -> PathBuf {
        self.sysfs_root.join("class/infiniband")
    }

    /// `/sys/class/infiniband/<ib_dev>`
    pub fn ib_dev(&self, ib_dev: &str) -> PathBuf {
        self.infiniband_class().join(ib_dev)
    }

    /// `/sys/class/net`
    pub fn net_class(&self) -> PathBuf {
        self.sysfs_root.join("class/net")
    }

    /// `/sys/class/net/<net_dev>`
    pub fn net_dev(&self, net_dev: &str) -> PathBuf {
        self.net_class().join(net_dev)
    }

    /// `/sys/bus/pci/devices`
    pub fn pci_devices(&self) -> PathBuf {
        self.sysfs_root.join("bus/pci/devices")
    }

    /// `/sys/module/<name>`
    pub fn module(&self, name: &str) -> PathBuf {
        self.sysfs_root.join("module").join(name)
    }

    /// `/proc/modules`
    pub fn proc_modules(&self) -> PathBuf {
        self.procfs_root.join("modules")
    }

    /// `/proc/net/if_inet6`
    pub fn if_inet6(&self) -> PathBuf {
        self.procfs_root.join("net/if_inet6")
    }
}

/// Read a sysfs attribute, trimmed.
pub fn read_attr(path: &Path) -> io::Result<String> {
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Read a sysfs attribute, or an empty string when it cannot be read.
///
/// Missing attributes are normal on older kernels and on Ethernet-only
/// functions, so they are logged at debug level only.
pub fn read_attr_or_empty(path: &Path) -> String {
    read_attr(path).unwrap_or_else(|e| {
        debug!(path = %path.display(), error = %e, "attribute unavailable");
        String::new()
    })
}

/// Names of the entries in `dir`, sorted.
pub fn list_dir(dir: &Path) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}


#[cfg(test)]
mod tests {
    use super::fake::FakeHost;
    use super::*;

    #[test]
    fn test_paths_follow_roots() {
        let paths = HostPaths::new("/tmp/sys", "/tmp/proc");
        assert_eq!(
            paths.ib_dev("mlx5_0"),
            PathBuf::from("/tmp/sys/class/infiniband/mlx5_0")
        );
        assert_eq!(paths.proc_modules(), PathBuf::from("/tmp/proc/modules"));
        assert_eq!(paths.if_inet6(), PathBuf::from("/tmp/proc/net/if_inet6"));
    }

    #[test]
    fn test_read_attr_trims_and_tolerates_missing() {
        let host = FakeHost::new();
        host.write("sys/class/net/eth0/operstate", "up\n");
        let paths = host.paths();
        assert_eq!(read_attr(&paths.net_dev("eth0").join("operstate")).unwrap(), "up");
        assert_eq!(read_attr_or_empty(&paths.net_dev("eth1").join("operstate")), "");
    }

    #[test]
    fn test_list_dir_sorted() {
        let host = FakeHost::new();
        host.mkdir("sys/class/infiniband/mlx5_1");
        host.mkdir("sys/class/infiniband/mlx5_0");
        let names = list_dir(&host.paths().infiniband_class()).unwrap();
        assert_eq!(names, vec!["mlx5_0", "mlx5_1"]);
    }
}
