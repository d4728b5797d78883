use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{Checker, Tally, names};
use crate::domain::{
    CheckLevel, CheckResult, GatewayResolution, InfinibandSnapshot, LinkLayer, ResolvedSpec,
};
use crate::ports::{Reachability, ReachabilityProbe};

/// RoCE adapters can reach their IPv4 gateway.
pub struct GatewayChecker {
    probe: Arc<dyn ReachabilityProbe>,
}

impl GatewayChecker {
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Checker for GatewayChecker {
    fn name(&self) -> &'static str {
        names::GATEWAY
    }

    async fn check(&self, snapshot: &InfinibandSnapshot, _spec: &ResolvedSpec) -> CheckResult {
        let mut tally = Tally::new(names::GATEWAY, CheckLevel::Critical);
        let mut probes = JoinSet::new();
        let mut roce_adapters = 0usize;

        for adapter in snapshot
            .adapters
            .iter()
            .filter(|a| a.link_layer == LinkLayer::Ethernet)
        {
            roce_adapters += 1;
            match adapter.gateway {
                Some(GatewayResolution::Resolved(gateway)) => {
                    let probe = Arc::clone(&self.probe);
                    let ib_dev = adapter.ib_dev.clone();
                    let net_dev = adapter.net_dev.clone();
                    probes.spawn(async move {
                        let outcome = probe.probe(&net_dev, gateway).await;
                        (ib_dev, net_dev, gateway, outcome)
                    });
                }
                Some(GatewayResolution::Ipv6Only | GatewayResolution::NoGateway(_)) => {}
                None => tally.fail(
                    &adapter.ib_dev,
                    format!("{}: gateway lookup failed: {}", adapter.ib_dev, adapter.gateway_error),
                ),
            }
        }

        if roce_adapters == 0 {
            return CheckResult::skipped(names::GATEWAY, "no RoCE adapters");
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "gateway probe task failed"),
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        for (ib_dev, net_dev, gateway, Reachability { reachable, method, detail }) in outcomes {
            let gateway = gateway.to_string();
            // The device is only marked failed through `fail` so it is listed once.
            tally.record(&ib_dev, &gateway, "reachable", true);
            if reachable {
                info!(%net_dev, %gateway, ?method, "gateway is reachable");
            } else {
                tally.fail(
                    &ib_dev,
                    format!("{ib_dev}: gateway {gateway} unreachable via {net_dev}: {detail}"),
                );
            }
        }

        tally.finish(|failed| format!("{} cannot reach gateway", failed.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::domain::{CheckStatus, NoGatewayReason};
    use crate::ports::ProbeMethod;
    use std::net::Ipv4Addr;

    struct FixedProbe {
        reachable: Vec<Ipv4Addr>,
    }

    #[async_trait]
    impl ReachabilityProbe for FixedProbe {
        async fn probe(&self, _net_dev: &str, gateway: Ipv4Addr) -> Reachability {
            if self.reachable.contains(&gateway) {
                Reachability::reachable(ProbeMethod::Icmp)
            } else {
                Reachability::unreachable("ping and tcp failed")
            }
        }
    }

    fn roce(ib_dev: &str, gateway: Option<GatewayResolution>) -> crate::domain::AdapterState {
        let mut a = adapter(ib_dev, "MT_A");
        a.link_layer = LinkLayer::Ethernet;
        a.gateway = gateway;
        a
    }

    fn checker(reachable: &[Ipv4Addr]) -> GatewayChecker {
        GatewayChecker::new(Arc::new(FixedProbe {
            reachable: reachable.to_vec(),
        }))
    }

    #[tokio::test]
    async fn test_reachable_gateways_pass() {
        let gw = Ipv4Addr::new(10, 0, 0, 1);
        let snap = snapshot(vec![
            roce("mlx5_0", Some(GatewayResolution::Resolved(gw))),
            roce("mlx5_1", Some(GatewayResolution::Ipv6Only)),
        ]);
        let result = checker(&[gw]).check(&snap, &spec(&["MT_A"])).await;
        assert_eq!(result.status, CheckStatus::Normal);
        assert_eq!(result.current, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_unreachable_and_failed_lookup_are_reported() {
        let mut failed = roce("mlx5_1", None);
        failed.gateway_error = "No gateway found for interface eth1".to_string();
        let snap = snapshot(vec![
            roce("mlx5_0", Some(GatewayResolution::Resolved(Ipv4Addr::new(10, 0, 0, 1)))),
            failed,
        ]);
        let result = checker(&[]).check(&snap, &spec(&["MT_A"])).await;
        assert!(result.is_abnormal());
        assert!(result.device.contains("mlx5_0"));
        assert!(result.device.contains("mlx5_1"));
        assert!(result.detail.contains("unreachable"));
        assert!(result.detail.contains("lookup failed"));
    }

    #[tokio::test]
    async fn test_infiniband_only_host_is_skipped() {
        let mut ib = adapter("mlx5_0", "MT_A");
        ib.gateway = Some(GatewayResolution::NoGateway(
            NoGatewayReason::InfiniBandLinkLayer,
        ));
        let result = checker(&[]).check(&snapshot(vec![ib]), &spec(&["MT_A"])).await;
        assert_eq!(result.status, CheckStatus::Skipped);
    }
}
