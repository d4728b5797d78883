use async_trait::async_trait;

use super::{Checker, Tally, names, no_adapters};
use crate::domain::{CheckLevel, CheckResult, CheckStatus, InfinibandSnapshot, ResolvedSpec};
use crate::utils::satisfies;

/// Module required for GPUDirect RDMA when NVIDIA GPUs are present.
pub const PEERMEM_MODULE: &str = "nvidia_peermem";

/// Installed OFED stack against the cluster's version constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfedChecker;

#[async_trait]
impl Checker for OfedChecker {
    fn name(&self) -> &'static str {
        names::OFED
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, spec: &ResolvedSpec) -> CheckResult {
        let level = CheckLevel::Warning;
        if snapshot.adapters.is_empty() {
            return no_adapters(names::OFED, level);
        }
        let expected = spec.sw_deps.ofed_ver.as_str();
        if expected.is_empty() {
            return CheckResult::skipped(names::OFED, "no OFED constraint in spec");
        }

        let current = snapshot.software.ofed_ver.as_str();
        let mut result = CheckResult {
            current: current.to_string(),
            expected: expected.to_string(),
            ..CheckResult::new(names::OFED, CheckLevel::Info)
        };
        match satisfies(expected, current) {
            Ok(true) => {}
            Ok(false) => {
                result.status = CheckStatus::Abnormal;
                result.level = level;
                result.detail =
                    format!("OFED version mismatch, expected:{expected}, current:{current}");
            }
            Err(e) => {
                result.status = CheckStatus::Abnormal;
                result.level = level;
                result.detail = format!("cannot evaluate OFED version: {e}");
            }
        }
        result
    }
}

/// Required kernel modules are loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelModuleChecker {
    require_peermem: bool,
}

impl KernelModuleChecker {
    pub const fn new(require_peermem: bool) -> Self {
        Self { require_peermem }
    }
}

#[async_trait]
impl Checker for KernelModuleChecker {
    fn name(&self) -> &'static str {
        names::KERNEL_MODULES
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, spec: &ResolvedSpec) -> CheckResult {
        let level = CheckLevel::Critical;
        if snapshot.adapters.is_empty() {
            return no_adapters(names::KERNEL_MODULES, level);
        }

        let mut expected: Vec<&str> = spec
            .sw_deps
            .kernel_module
            .iter()
            .map(String::as_str)
            .collect();
        if self.require_peermem && !expected.contains(&PEERMEM_MODULE) {
            expected.push(PEERMEM_MODULE);
        }
        let loaded = &snapshot.software.kernel_modules;
        let missing: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|module| !loaded.iter().any(|l| l == module))
            .collect();

        let mut result = CheckResult {
            current: loaded.join(","),
            expected: expected.join(","),
            ..CheckResult::new(names::KERNEL_MODULES, CheckLevel::Info)
        };
        if !missing.is_empty() {
            result.status = CheckStatus::Abnormal;
            result.level = level;
            result.detail = format!("need to install kmod:{}", missing.join(","));
        }
        result
    }
}

/// Every RDMA device named in the spec exists with the expected net device.
#[derive(Debug, Clone, Copy, Default)]
pub struct IbDevsChecker;

#[async_trait]
impl Checker for IbDevsChecker {
    fn name(&self) -> &'static str {
        names::IB_DEVS
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, spec: &ResolvedSpec) -> CheckResult {
        if spec.ib_devs.is_empty() {
            return CheckResult::skipped(names::IB_DEVS, "no ib_devs in spec");
        }

        let mut tally = Tally::new(names::IB_DEVS, CheckLevel::Critical);
        for (ib_dev, net_dev) in &spec.ib_devs {
            let expected = format!("{ib_dev}:{net_dev}");
            match snapshot.adapter(ib_dev) {
                Some(adapter) => {
                    let current = format!("{}:{}", adapter.ib_dev, adapter.net_dev);
                    tally.record(ib_dev, &current, &expected, &adapter.net_dev == net_dev);
                }
                None => tally.record(ib_dev, "", &expected, false),
            }
        }
        tally.finish(|failed| format!("{} missing or misnamed", failed.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_ofed_constraint_satisfied() {
        let result = OfedChecker
            .check(&snapshot(vec![adapter("mlx5_0", "MT_A")]), &spec(&["MT_A"]))
            .await;
        assert_eq!(result.status, CheckStatus::Normal);
        assert_eq!(result.current, "MLNX_OFED_LINUX-23.10-1.1.9.0");
    }

    #[tokio::test]
    async fn test_ofed_too_old() {
        let mut snap = snapshot(vec![adapter("mlx5_0", "MT_A")]);
        snap.software.ofed_ver = "MLNX_OFED_LINUX-5.9-0.5.6.0".to_string();
        let result = OfedChecker.check(&snap, &spec(&["MT_A"])).await;
        assert!(result.is_abnormal());
        assert!(result.detail.contains("mismatch"));
    }

    #[tokio::test]
    async fn test_inbox_driver_cannot_be_evaluated() {
        let mut snap = snapshot(vec![adapter("mlx5_0", "MT_A")]);
        snap.software.ofed_ver = "rdma-core:5.15".to_string();
        let result = OfedChecker.check(&snap, &spec(&["MT_A"])).await;
        assert!(result.is_abnormal());
        assert!(result.detail.starts_with("cannot evaluate"));
    }

    #[tokio::test]
    async fn test_missing_kernel_module() {
        let mut snap = snapshot(vec![adapter("mlx5_0", "MT_A")]);
        snap.software.kernel_modules = vec!["mlx5_core".to_string()];
        let result = KernelModuleChecker::new(false)
            .check(&snap, &spec(&["MT_A"]))
            .await;
        assert!(result.is_abnormal());
        assert_eq!(result.detail, "need to install kmod:ib_core");
    }

    #[tokio::test]
    async fn test_peermem_required_with_gpus() {
        let snap = snapshot(vec![adapter("mlx5_0", "MT_A")]);
        let result = KernelModuleChecker::new(true)
            .check(&snap, &spec(&["MT_A"]))
            .await;
        assert!(result.is_abnormal());
        assert!(result.expected.ends_with(PEERMEM_MODULE));
    }

    #[tokio::test]
    async fn test_ib_devs_mapping() {
        let spec = spec(&["MT_A"]);
        let ok = IbDevsChecker
            .check(&snapshot(vec![adapter("mlx5_0", "MT_A")]), &spec)
            .await;
        assert_eq!(ok.status, CheckStatus::Normal);

        let missing = IbDevsChecker
            .check(&snapshot(vec![adapter("mlx5_4", "MT_A")]), &spec)
            .await;
        assert!(missing.is_abnormal());
        assert_eq!(missing.device, "mlx5_0");
    }
}
