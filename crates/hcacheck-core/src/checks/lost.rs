use async_trait::async_trait;

use super::{Checker, Tally, names};
use crate::domain::{CheckLevel, CheckResult, InfinibandSnapshot, ResolvedSpec};

/// Every supported adapter on the PCI bus has an RDMA device.
///
/// An adapter that the PCI scan sees but the RDMA stack does not is lost,
/// usually after a driver or firmware failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LostAdapterChecker;

#[async_trait]
impl Checker for LostAdapterChecker {
    fn name(&self) -> &'static str {
        names::LOST_ADAPTERS
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, _spec: &ResolvedSpec) -> CheckResult {
        if snapshot.pci_functions.is_empty() {
            return CheckResult::skipped(names::LOST_ADAPTERS, "no supported PCI functions found");
        }

        let mut tally = Tally::new(names::LOST_ADAPTERS, CheckLevel::Critical);
        for function in &snapshot.pci_functions {
            let current = if function.is_lost() {
                String::new()
            } else {
                function.ib_devs.join("|")
            };
            tally.record(&function.bdf, &current, "rdma", !function.is_lost());
        }

        let lost = snapshot.pci_functions.iter().filter(|f| f.is_lost()).count();
        let found = snapshot.pci_functions.len();
        let adapters = snapshot.adapters.len();
        tally.finish(|failed| {
            format!(
                "{lost} of {found} PCI functions have no RDMA device ({}), {adapters} adapters collected",
                failed.join(",")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::domain::{CheckStatus, PciFunction};

    fn function(bdf: &str, ib_devs: &[&str]) -> PciFunction {
        PciFunction {
            bdf: bdf.to_string(),
            vendor_id: "0x15b3".to_string(),
            device_id: "0x1021".to_string(),
            ib_devs: ib_devs.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_all_functions_registered() {
        let mut snap = snapshot(vec![adapter("mlx5_0", "MT_A"), adapter("mlx5_1", "MT_A")]);
        snap.pci_functions = vec![
            function("0000:1a:00.0", &["mlx5_0"]),
            function("0000:2b:00.0", &["mlx5_1"]),
        ];
        let result = LostAdapterChecker.check(&snap, &spec(&["MT_A"])).await;
        assert_eq!(result.status, CheckStatus::Normal);
        assert_eq!(result.current, "mlx5_0,mlx5_1");
    }

    #[tokio::test]
    async fn test_function_without_rdma_device_is_lost() {
        let mut snap = snapshot(vec![adapter("mlx5_0", "MT_A")]);
        snap.pci_functions = vec![
            function("0000:1a:00.0", &["mlx5_0"]),
            function("0000:2b:00.0", &[]),
        ];
        let result = LostAdapterChecker.check(&snap, &spec(&["MT_A"])).await;
        assert!(result.is_abnormal());
        assert_eq!(result.level, CheckLevel::Critical);
        assert_eq!(result.device, "0000:2b:00.0");
        assert!(result.detail.starts_with("1 of 2 PCI functions"));
    }

    #[tokio::test]
    async fn test_without_scan_result_is_skipped() {
        let result = LostAdapterChecker
            .check(&snapshot(vec![adapter("mlx5_0", "MT_A")]), &spec(&["MT_A"]))
            .await;
        assert_eq!(result.status, CheckStatus::Skipped);
    }
}
