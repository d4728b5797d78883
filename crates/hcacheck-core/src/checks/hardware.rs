use async_trait::async_trait;
use tracing::warn;

use super::{Checker, Tally, names, no_adapters, with_specs};
use crate::domain::{
    AdapterState, CheckLevel, CheckResult, HardwareSpec, InfinibandSnapshot, ResolvedSpec,
};
use crate::utils::firmware_satisfies;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matching {
    /// The collected value contains the expected text (`4: ACTIVE` vs `ACTIVE`).
    Contains,
    /// Case-insensitive equality after trimming.
    Exact,
}

/// A hardware attribute compared one-to-one against the adapter's spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareField {
    PortState,
    PhyState,
    LinkLayer,
    PortSpeed,
    NetOperstate,
    PcieSpeed,
    PcieWidth,
    PcieTreeSpeed,
    PcieTreeWidth,
    PcieMrr,
}

impl HardwareField {
    pub const ALL: [Self; 10] = [
        Self::PortState,
        Self::PhyState,
        Self::LinkLayer,
        Self::PortSpeed,
        Self::NetOperstate,
        Self::PcieSpeed,
        Self::PcieWidth,
        Self::PcieTreeSpeed,
        Self::PcieTreeWidth,
        Self::PcieMrr,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::PortState => names::PORT_STATE,
            Self::PhyState => names::PHY_STATE,
            Self::LinkLayer => names::LINK_LAYER,
            Self::PortSpeed => names::PORT_SPEED,
            Self::NetOperstate => names::NET_OPERSTATE,
            Self::PcieSpeed => names::PCIE_SPEED,
            Self::PcieWidth => names::PCIE_WIDTH,
            Self::PcieTreeSpeed => names::PCIE_TREE_SPEED,
            Self::PcieTreeWidth => names::PCIE_TREE_WIDTH,
            Self::PcieMrr => names::PCIE_MRR,
        }
    }

    const fn level(self) -> CheckLevel {
        match self {
            Self::PcieMrr => CheckLevel::Info,
            Self::LinkLayer => CheckLevel::Warning,
            _ => CheckLevel::Critical,
        }
    }

    const fn matching(self) -> Matching {
        match self {
            Self::PcieWidth | Self::PcieTreeWidth | Self::PcieMrr | Self::LinkLayer => {
                Matching::Exact
            }
            _ => Matching::Contains,
        }
    }

    fn current(self, adapter: &AdapterState) -> String {
        match self {
            Self::PortState => adapter.port_state.clone(),
            Self::PhyState => adapter.phy_state.clone(),
            Self::LinkLayer => adapter.link_layer.to_string(),
            Self::PortSpeed => adapter.port_speed.clone(),
            Self::NetOperstate => adapter.net_operstate.clone(),
            Self::PcieSpeed => adapter.pcie_speed.clone(),
            Self::PcieWidth => adapter.pcie_width.clone(),
            Self::PcieTreeSpeed => adapter.pcie_tree_speed.clone(),
            Self::PcieTreeWidth => adapter.pcie_tree_width.clone(),
            Self::PcieMrr => adapter.pcie_mrr.clone(),
        }
    }

    fn expected(self, spec: &HardwareSpec) -> &str {
        match self {
            Self::PortState => &spec.port_state,
            Self::PhyState => &spec.phy_state,
            Self::LinkLayer => &spec.link_layer,
            Self::PortSpeed => &spec.port_speed,
            Self::NetOperstate => &spec.net_operstate,
            Self::PcieSpeed => &spec.pcie_speed,
            Self::PcieWidth => &spec.pcie_width,
            Self::PcieTreeSpeed => &spec.pcie_tree_speed,
            Self::PcieTreeWidth => &spec.pcie_tree_width,
            Self::PcieMrr => &spec.pcie_mrr,
        }
    }

    fn accepts(self, current: &str, expected: &str) -> bool {
        let current = current.trim();
        let expected = expected.trim();
        match self.matching() {
            Matching::Contains => current.contains(expected),
            Matching::Exact => current.eq_ignore_ascii_case(expected),
        }
    }
}

/// Compares one [`HardwareField`] on every adapter.
#[derive(Debug, Clone, Copy)]
pub struct FieldChecker {
    field: HardwareField,
}

impl FieldChecker {
    pub const fn new(field: HardwareField) -> Self {
        Self { field }
    }

    pub fn all() -> Vec<Self> {
        HardwareField::ALL.into_iter().map(Self::new).collect()
    }
}

#[async_trait]
impl Checker for FieldChecker {
    fn name(&self) -> &'static str {
        self.field.name()
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, spec: &ResolvedSpec) -> CheckResult {
        let (name, level) = (self.field.name(), self.field.level());
        if snapshot.adapters.is_empty() {
            return no_adapters(name, level);
        }

        let mut tally = Tally::new(name, level);
        for (adapter, adapter_spec) in with_specs(snapshot, spec, name) {
            let expected = self.field.expected(&adapter_spec.hardware);
            if expected.is_empty() {
                continue;
            }
            let current = self.field.current(adapter);
            let ok = self.field.accepts(&current, expected);
            tally.record(&adapter.ib_dev, &current, expected, ok);
        }
        tally.finish(|failed| format!("{} does not match spec", failed.join(",")))
    }
}

/// Firmware version against the spec's constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirmwareChecker;

#[async_trait]
impl Checker for FirmwareChecker {
    fn name(&self) -> &'static str {
        names::FIRMWARE
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, spec: &ResolvedSpec) -> CheckResult {
        if snapshot.adapters.is_empty() {
            return no_adapters(names::FIRMWARE, CheckLevel::Warning);
        }

        let mut tally = Tally::new(names::FIRMWARE, CheckLevel::Warning);
        for (adapter, adapter_spec) in with_specs(snapshot, spec, names::FIRMWARE) {
            let expected = adapter_spec.hardware.fw_ver.as_str();
            if expected.is_empty() {
                continue;
            }
            match firmware_satisfies(expected, &adapter.fw_ver) {
                Ok(ok) => {
                    if !ok {
                        warn!(
                            ib_dev = %adapter.ib_dev,
                            board_id = %adapter.board_id,
                            current = %adapter.fw_ver,
                            expected,
                            "firmware does not satisfy spec"
                        );
                    }
                    tally.record(&adapter.ib_dev, &adapter.fw_ver, expected, ok);
                }
                Err(e) => {
                    tally.record(&adapter.ib_dev, &adapter.fw_ver, expected, true);
                    tally.fail(&adapter.ib_dev, format!("{}: {e}", adapter.ib_dev));
                }
            }
        }
        tally.finish(|failed| format!("firmware of {} does not satisfy spec", failed.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::domain::{CheckStatus, LinkLayer};

    #[tokio::test]
    async fn test_contains_match_on_state() {
        let checker = FieldChecker::new(HardwareField::PortState);
        let result = checker
            .check(&snapshot(vec![adapter("mlx5_0", "MT_A")]), &spec(&["MT_A"]))
            .await;
        assert_eq!(result.status, CheckStatus::Normal);
        assert_eq!(result.current, "4: ACTIVE");
        assert_eq!(result.expected, "ACTIVE");
        assert_eq!(result.level, CheckLevel::Info);
    }

    #[tokio::test]
    async fn test_exact_match_on_width() {
        let mut narrow = adapter("mlx5_1", "MT_A");
        narrow.pcie_width = "160".to_string();
        let checker = FieldChecker::new(HardwareField::PcieWidth);
        let result = checker
            .check(
                &snapshot(vec![adapter("mlx5_0", "MT_A"), narrow]),
                &spec(&["MT_A"]),
            )
            .await;
        assert_eq!(result.status, CheckStatus::Abnormal);
        assert_eq!(result.device, "mlx5_1");
        assert_eq!(result.level, CheckLevel::Critical);
    }

    #[tokio::test]
    async fn test_link_layer_compares_display_name() {
        let mut roce = adapter("mlx5_0", "MT_A");
        roce.link_layer = LinkLayer::Ethernet;
        let result = FieldChecker::new(HardwareField::LinkLayer)
            .check(&snapshot(vec![roce]), &spec(&["MT_A"]))
            .await;
        assert!(result.is_abnormal());
        assert_eq!(result.current, "Ethernet");
    }

    #[tokio::test]
    async fn test_empty_expectation_is_not_compared() {
        let mut spec = spec(&["MT_A"]);
        if let Some(entry) = spec.adapters.get_mut("MT_A") {
            entry.hardware.pcie_mrr.clear();
        }
        let mut low = adapter("mlx5_0", "MT_A");
        low.pcie_mrr = "512".to_string();
        let result = FieldChecker::new(HardwareField::PcieMrr)
            .check(&snapshot(vec![low]), &spec)
            .await;
        assert_eq!(result.status, CheckStatus::Normal);
        assert!(result.current.is_empty());
    }

    #[tokio::test]
    async fn test_old_firmware_fails() {
        let mut old = adapter("mlx5_1", "MT_A");
        old.fw_ver = "28.38.1000".to_string();
        let result = FirmwareChecker
            .check(&snapshot(vec![adapter("mlx5_0", "MT_A"), old]), &spec(&["MT_A"]))
            .await;
        assert!(result.is_abnormal());
        assert_eq!(result.device, "mlx5_1");
        assert_eq!(result.level, CheckLevel::Warning);
        assert!(result.detail.contains("mlx5_1"));
    }

    #[tokio::test]
    async fn test_malformed_firmware_reported_distinctly() {
        let mut odd = adapter("mlx5_0", "MT_A");
        odd.fw_ver = "unknown".to_string();
        let result = FirmwareChecker
            .check(&snapshot(vec![odd]), &spec(&["MT_A"]))
            .await;
        assert!(result.is_abnormal());
        assert!(result.detail.starts_with("mlx5_0: "));
        assert!(!result.detail.contains("does not satisfy"));
    }
}
