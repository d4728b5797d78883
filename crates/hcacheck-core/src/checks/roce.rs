use async_trait::async_trait;

use super::{Checker, Tally, names, no_adapters};
use crate::domain::{
    AdapterState, CheckLevel, CheckResult, InfinibandSnapshot, LinkLayer, NicRole, ResolvedSpec,
};

/// `sriov_totalvfs` expected when the spec does not name one.
pub const DEFAULT_VF_SPEC: &str = "127";

/// Configured VF counts accepted when the spec does not name any.
pub const DEFAULT_VF_NUMS: &[&str] = &["16", "32"];

/// SR-IOV provisioning of RoCE adapters.
///
/// On SR-IOV nodes every first function must advertise the expected VF
/// capacity and have an accepted number of VFs configured. Elsewhere no VFs
/// may be configured at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoceVfChecker;

impl RoceVfChecker {
    fn expected_spec<'a>(adapter: &AdapterState, spec: &'a ResolvedSpec) -> &'a str {
        spec.adapter(&adapter.board_id)
            .map(|s| s.hardware.vf_spec.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VF_SPEC)
    }

    fn expected_nums<'a>(adapter: &AdapterState, spec: &'a ResolvedSpec) -> Vec<&'a str> {
        spec.adapter(&adapter.board_id)
            .map(|s| s.hardware.vf_num.iter().map(String::as_str).collect::<Vec<_>>())
            .filter(|nums| !nums.is_empty())
            .unwrap_or_else(|| DEFAULT_VF_NUMS.to_vec())
    }
}

#[async_trait]
impl Checker for RoceVfChecker {
    fn name(&self) -> &'static str {
        names::ROCE_VF
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, spec: &ResolvedSpec) -> CheckResult {
        let level = CheckLevel::Critical;
        if snapshot.adapters.is_empty() {
            return no_adapters(names::ROCE_VF, level);
        }

        let mut tally = Tally::new(names::ROCE_VF, level);
        let mut roce_adapters = 0usize;
        for adapter in snapshot
            .adapters
            .iter()
            .filter(|a| a.link_layer == LinkLayer::Ethernet)
        {
            roce_adapters += 1;
            let ib_dev = adapter.ib_dev.as_str();
            let vf_num = adapter.vf_num.as_str();
            let mut problems = Vec::new();

            if snapshot.nic_role == NicRole::Sriov {
                let expected_spec = Self::expected_spec(adapter, spec);
                if adapter.vf_spec != expected_spec {
                    problems.push(format!(
                        "{ib_dev}: VF capacity is {}, expected {expected_spec}",
                        adapter.vf_spec
                    ));
                }
                // VFs are only configured on the first function of a port pair.
                if !adapter.pcie_bdf.ends_with(".1") {
                    let expected_nums = Self::expected_nums(adapter, spec).join("|");
                    tally.record(ib_dev, vf_num, &expected_nums, true);
                    if !expected_nums.split('|').any(|n| n == vf_num) {
                        problems.push(format!(
                            "{ib_dev}: {vf_num:?} VFs configured, expected one of {expected_nums}"
                        ));
                    }
                }
            } else {
                tally.record(ib_dev, vf_num, "0", true);
                if !(vf_num.is_empty() || vf_num == "0") {
                    problems.push(format!("{ib_dev}: {vf_num} VFs configured on a non SR-IOV node"));
                }
            }

            // Failures go through `fail` only so each device is listed once.
            if !problems.is_empty() {
                tally.fail(ib_dev, problems.join("; "));
            }
        }

        if roce_adapters == 0 {
            return CheckResult::skipped(names::ROCE_VF, "no RoCE adapters");
        }
        tally.finish(|failed| format!("{} VF provisioning mismatch", failed.join(",")))
    }
}
