//! RDMA software stack facts: OFED version and loaded kernel modules.

use std::sync::Arc;
use std::time::Duration;

use hcacheck_core::SoftwareState;
use hcacheck_core::checks::PEERMEM_MODULE;
use hcacheck_core::ports::{CommandRequest, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use tracing::{debug, warn};

use crate::host::{HostPaths, read_attr};
use crate::inventory::has_nvidia_gpu;

/// Kernel modules every RDMA host needs.
pub const EXPECTED_KERNEL_MODULES: &[&str] = &[
    "rdma_ucm", "rdma_cm", "ib_ipoib", "mlx5_core", "mlx5_ib", "ib_uverbs", "ib_umad", "ib_cm",
    "ib_core", "mlxfw",
];

/// Prefix used when only the in-tree driver version is available.
pub const RDMA_CORE_PREFIX: &str = "rdma-core";

pub struct SoftwareCollector {
    paths: HostPaths,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl SoftwareCollector {
    pub fn new(paths: HostPaths, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            paths,
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn collect(&self) -> SoftwareState {
        SoftwareState {
            ofed_ver: self.ofed_version().await,
            kernel_modules: self.loaded_modules(&self.expected_modules()),
        }
    }

    /// `ofed_info -s`, else the inbox `mlx5_core` module version.
    pub async fn ofed_version(&self) -> String {
        let request = CommandRequest::new("ofed_info", ["-s"]).with_timeout(self.timeout);
        match self.runner.stdout(request).await {
            Ok(stdout) => {
                // "MLNX_OFED_LINUX-23.10-1.1.9.0:"
                let version = stdout.split(':').next().unwrap_or_default().trim();
                if !version.is_empty() {
                    return version.to_string();
                }
                debug!("ofed_info printed nothing");
            }
            Err(e) => debug!(error = %e, "ofed_info unavailable, trying inbox driver"),
        }

        let path = self.paths.module("mlx5_core").join("version");
        match read_attr(&path) {
            Ok(version) if !version.is_empty() => format!("{RDMA_CORE_PREFIX}:{version}"),
            Ok(_) | Err(_) => {
                warn!("no OFED or inbox driver version found");
                String::new()
            }
        }
    }

    /// Modules to look for on this host.
    pub fn expected_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = EXPECTED_KERNEL_MODULES
            .iter()
            .map(|m| (*m).to_string())
            .collect();
        if has_nvidia_gpu(&self.paths) {
            modules.push(PEERMEM_MODULE.to_string());
        }
        modules
    }

    /// The subset of `expected` listed in `/proc/modules`, in `expected` order.
    pub fn loaded_modules(&self, expected: &[String]) -> Vec<String> {
        let path = self.paths.proc_modules();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read module list");
                return Vec::new();
            }
        };
        let loaded: Vec<&str> = text
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        expected
            .iter()
            .filter(|module| loaded.contains(&module.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;
    use crate::process::mock::{MockRunner, exit, ok};

    const PROC_MODULES: &str = "\
mlx5_ib 466944 0 - Live 0x0000000000000000
ib_uverbs 184320 2 rdma_ucm,mlx5_ib, Live 0x0000000000000000
mlx5_core 2220032 1 mlx5_ib, Live 0x0000000000000000
ib_core 434176 8 rdma_cm,ib_ipoib, Live 0x0000000000000000
nvidia_peermem 16384 0 - Live 0x0000000000000000
";

    #[tokio::test]
    async fn test_ofed_info_output_is_trimmed() {
        let host = FakeHost::new();
        let mut runner = MockRunner::new();
        runner
            .expect_run()
            .withf(|req| req.program == "ofed_info")
            .returning(|_| ok("MLNX_OFED_LINUX-23.10-1.1.9.0:\n"));

        let collector = SoftwareCollector::new(host.paths(), Arc::new(runner));
        assert_eq!(collector.ofed_version().await, "MLNX_OFED_LINUX-23.10-1.1.9.0");
    }

    #[tokio::test]
    async fn test_inbox_driver_fallback() {
        let host = FakeHost::new();
        host.write("sys/module/mlx5_core/version", "24.01\n");
        let mut runner = MockRunner::new();
        runner.expect_run().returning(|_| exit(127, "ofed_info: not found"));

        let collector = SoftwareCollector::new(host.paths(), Arc::new(runner));
        assert_eq!(collector.ofed_version().await, "rdma-core:24.01");
    }

    #[tokio::test]
    async fn test_no_version_anywhere_is_empty() {
        let host = FakeHost::new();
        let mut runner = MockRunner::new();
        runner.expect_run().returning(|_| exit(127, ""));
        let collector = SoftwareCollector::new(host.paths(), Arc::new(runner));
        assert_eq!(collector.ofed_version().await, "");
    }

    #[test]
    fn test_loaded_modules_keep_expected_order() {
        let host = FakeHost::new();
        host.write("proc/modules", PROC_MODULES);
        let collector = SoftwareCollector::new(host.paths(), Arc::new(MockRunner::new()));

        let expected = collector.expected_modules();
        assert!(!expected.iter().any(|m| m == PEERMEM_MODULE));
        assert_eq!(
            collector.loaded_modules(&expected),
            vec!["mlx5_core", "mlx5_ib", "ib_uverbs", "ib_core"]
        );
    }

    #[test]
    fn test_gpu_host_expects_peermem() {
        let host = FakeHost::new();
        host.write("proc/modules", PROC_MODULES);
        host.write("sys/bus/pci/devices/0000:5d:00.0/vendor", "0x10de\n");
        host.write("sys/bus/pci/devices/0000:5d:00.0/class", "0x030200\n");
        let collector = SoftwareCollector::new(host.paths(), Arc::new(MockRunner::new()));

        let expected = collector.expected_modules();
        assert_eq!(expected.last().map(String::as_str), Some(PEERMEM_MODULE));
        assert!(collector.loaded_modules(&expected).contains(&PEERMEM_MODULE.to_string()));
    }
}
