//! Check items.
//!
//! Each checker reads an already-collected [`InfinibandSnapshot`] and the
//! [`ResolvedSpec`] and returns one [`CheckResult`]. Checkers do no I/O of
//! their own except through ports (gateway reachability).

mod gateway;
mod hardware;
mod lost;
mod roce;
mod software;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::domain::{
    AdapterSpec, AdapterState, CheckLevel, CheckReport, CheckResult, CheckStatus,
    InfinibandSnapshot, ResolvedSpec,
};
use crate::ports::ReachabilityProbe;

pub use gateway::GatewayChecker;
pub use hardware::{FieldChecker, FirmwareChecker};
pub use lost::LostAdapterChecker;
pub use roce::{DEFAULT_VF_NUMS, DEFAULT_VF_SPEC, RoceVfChecker};
pub use software::{IbDevsChecker, KernelModuleChecker, OfedChecker, PEERMEM_MODULE};

/// Detail used when the snapshot has no adapters at all.
pub const NO_ADAPTER_FOUND: &str = "no_ib_found";

/// Check item names.
pub mod names {
    pub const OFED: &str = "check_ib_ofed";
    pub const FIRMWARE: &str = "check_ib_fw";
    pub const PORT_STATE: &str = "check_ib_state";
    pub const PHY_STATE: &str = "check_ib_phy_state";
    pub const LINK_LAYER: &str = "check_ib_link_layer";
    pub const PORT_SPEED: &str = "check_ib_port_speed";
    pub const NET_OPERSTATE: &str = "check_net_operstate";
    pub const KERNEL_MODULES: &str = "check_ib_kmod";
    pub const IB_DEVS: &str = "check_ib_devs";
    pub const PCIE_MRR: &str = "check_pcie_mrr";
    pub const PCIE_SPEED: &str = "check_pcie_speed";
    pub const PCIE_WIDTH: &str = "check_pcie_width";
    pub const PCIE_TREE_SPEED: &str = "check_pcie_tree_speed";
    pub const PCIE_TREE_WIDTH: &str = "check_pcie_tree_width";
    pub const GATEWAY: &str = "check_roce_gateway";
    pub const ROCE_VF: &str = "check_roce_vf";
    pub const LOST_ADAPTERS: &str = "check_ib_lost";
}

/// One check item.
#[async_trait]
pub trait Checker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, snapshot: &InfinibandSnapshot, spec: &ResolvedSpec) -> CheckResult;
}

/// Options for [`default_checkers`].
#[derive(Clone, Default)]
pub struct CheckerOptions {
    /// Expect `nvidia_peermem` in addition to the spec's kernel modules.
    pub require_peermem: bool,
    /// Probe used for gateway reachability; the item is skipped without one.
    pub probe: Option<Arc<dyn ReachabilityProbe>>,
}

/// The full set of check items.
pub fn default_checkers(options: CheckerOptions) -> Vec<Arc<dyn Checker>> {
    let mut checkers: Vec<Arc<dyn Checker>> = vec![
        Arc::new(OfedChecker),
        Arc::new(KernelModuleChecker::new(options.require_peermem)),
        Arc::new(IbDevsChecker),
        Arc::new(FirmwareChecker),
        Arc::new(LostAdapterChecker),
        Arc::new(RoceVfChecker),
    ];
    checkers.extend(
        FieldChecker::all()
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn Checker>),
    );
    if let Some(probe) = options.probe {
        checkers.push(Arc::new(GatewayChecker::new(probe)));
    }
    checkers
}

/// Run all checkers concurrently and collect their results by name.
pub async fn run_checks(
    checkers: &[Arc<dyn Checker>],
    snapshot: Arc<InfinibandSnapshot>,
    spec: Arc<ResolvedSpec>,
) -> CheckReport {
    let mut tasks = JoinSet::new();
    for checker in checkers {
        let checker = Arc::clone(checker);
        let snapshot = Arc::clone(&snapshot);
        let spec = Arc::clone(&spec);
        tasks.spawn(async move { checker.check(&snapshot, &spec).await });
    }

    let mut results = Vec::with_capacity(checkers.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                debug!(check = %result.name, status = ?result.status, "check finished");
                results.push(result);
            }
            Err(e) => error!(error = %e, "check task failed"),
        }
    }
    results.sort_by(|a, b| a.name.cmp(&b.name));
    CheckReport::new(results)
}

/// Collects per-adapter comparisons into one result.
struct Tally {
    result: CheckResult,
    failed: Vec<String>,
    current: Vec<String>,
    expected: Vec<String>,
    details: Vec<String>,
}

impl Tally {
    fn new(name: &str, level: CheckLevel) -> Self {
        Self {
            result: CheckResult::new(name, level),
            failed: Vec::new(),
            current: Vec::new(),
            expected: Vec::new(),
            details: Vec::new(),
        }
    }

    fn record(&mut self, device: &str, current: &str, expected: &str, ok: bool) {
        self.current.push(current.to_string());
        self.expected.push(expected.to_string());
        if !ok {
            self.failed.push(device.to_string());
        }
    }

    fn fail(&mut self, device: &str, detail: String) {
        self.failed.push(device.to_string());
        self.details.push(detail);
    }

    fn finish(self, failure_detail: impl FnOnce(&[String]) -> String) -> CheckResult {
        let mut result = self.result;
        result.current = self.current.join(",");
        result.expected = self.expected.join(",");
        if self.failed.is_empty() {
            result.level = CheckLevel::Info;
            result.detail = self.details.join("; ");
            return result;
        }
        result.status = CheckStatus::Abnormal;
        result.device = self.failed.join(",");
        result.detail = if self.details.is_empty() {
            failure_detail(&self.failed)
        } else {
            self.details.join("; ")
        };
        result
    }
}

/// Result for a snapshot without adapters.
fn no_adapters(name: &str, level: CheckLevel) -> CheckResult {
    CheckResult {
        status: CheckStatus::Abnormal,
        detail: NO_ADAPTER_FOUND.to_string(),
        ..CheckResult::new(name, level)
    }
}

/// Adapters paired with their spec entry. Adapters without one are skipped.
fn with_specs<'a>(
    snapshot: &'a InfinibandSnapshot,
    spec: &'a ResolvedSpec,
    check: &str,
) -> impl Iterator<Item = (&'a AdapterState, &'a AdapterSpec)> {
    let check = check.to_string();
    snapshot.adapters.iter().filter_map(move |adapter| {
        let found = spec.adapter(&adapter.board_id);
        if found.is_none() {
            debug!(check = %check, board_id = %adapter.board_id, "no spec for adapter, skipping");
        }
        found.map(|s| (adapter, s))
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::{HardwareSpec, LinkLayer, SoftwareDeps, SoftwareState};

    pub fn adapter(ib_dev: &str, board_id: &str) -> AdapterState {
        AdapterState {
            ib_dev: ib_dev.to_string(),
            net_dev: ib_dev.replace("mlx5_", "ib"),
            board_id: board_id.to_string(),
            fw_ver: "28.39.1002".to_string(),
            phy_state: "5: LinkUp".to_string(),
            port_state: "4: ACTIVE".to_string(),
            link_layer: LinkLayer::InfiniBand,
            port_speed: "400 Gb/sec (4X NDR)".to_string(),
            net_operstate: "up".to_string(),
            pcie_speed: "32.0 GT/s PCIe".to_string(),
            pcie_width: "16".to_string(),
            pcie_tree_speed: "32".to_string(),
            pcie_tree_width: "16".to_string(),
            pcie_mrr: "4096".to_string(),
            ..AdapterState::default()
        }
    }

    pub fn snapshot(adapters: Vec<AdapterState>) -> InfinibandSnapshot {
        InfinibandSnapshot {
            adapters,
            software: SoftwareState {
                ofed_ver: "MLNX_OFED_LINUX-23.10-1.1.9.0".to_string(),
                kernel_modules: vec!["mlx5_core".to_string(), "ib_core".to_string()],
            },
            ..InfinibandSnapshot::default()
        }
    }

    pub fn spec(board_ids: &[&str]) -> ResolvedSpec {
        let hardware = HardwareSpec {
            fw_ver: ">=28.39.1002".to_string(),
            phy_state: "LinkUp".to_string(),
            port_state: "ACTIVE".to_string(),
            port_speed: "400 Gb/sec".to_string(),
            link_layer: "InfiniBand".to_string(),
            net_operstate: "up".to_string(),
            pcie_speed: "32.0 GT/s".to_string(),
            pcie_width: "16".to_string(),
            pcie_tree_speed: "32".to_string(),
            pcie_tree_width: "16".to_string(),
            pcie_mrr: "4096".to_string(),
            ..HardwareSpec::default()
        };
        ResolvedSpec {
            cluster: "default".to_string(),
            ib_devs: [("mlx5_0".to_string(), "ib0".to_string())].into(),
            sw_deps: SoftwareDeps {
                ofed_ver: ">=MLNX_OFED_LINUX-23.10-1.1.9.0".to_string(),
                kernel_module: vec!["mlx5_core".to_string(), "ib_core".to_string()],
                ..SoftwareDeps::default()
            },
            adapters: board_ids
                .iter()
                .map(|id| {
                    let mut hardware = hardware.clone();
                    hardware.board_id = (*id).to_string();
                    (
                        (*id).to_string(),
                        AdapterSpec {
                            hardware,
                            ..AdapterSpec::default()
                        },
                    )
                })
                .collect(),
            ..ResolvedSpec::default()
        }
    }
}
