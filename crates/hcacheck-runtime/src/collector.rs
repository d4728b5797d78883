//! One collection pass over every adapter on the host.

use std::sync::Arc;

use hcacheck_core::ports::{CommandRunner, LinkInspector, RouteSource};
use hcacheck_core::{AdapterState, GatewayResolver, InfinibandSnapshot, NicRole, Settings};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::counters::CounterCollector;
use crate::error::CollectError;
use crate::hardware::HardwareCollector;
use crate::host::HostPaths;
use crate::inventory::{physical_ib_devs, scan_pci_adapters};
use crate::netdev::SysfsLinkInspector;
use crate::routing::NetlinkRouteSource;
use crate::software::SoftwareCollector;

/// Builds an [`InfinibandSnapshot`].
///
/// Adapters are collected concurrently, one task each. Within a task the
/// hardware facts, gateway and counters are gathered in turn.
#[derive(Clone)]
pub struct SnapshotCollector {
    paths: HostPaths,
    hardware: Arc<HardwareCollector>,
    software: Arc<SoftwareCollector>,
    counters: Arc<CounterCollector>,
    gateways: GatewayResolver,
}

impl SnapshotCollector {
    pub fn new(
        paths: HostPaths,
        hardware: HardwareCollector,
        software: SoftwareCollector,
        gateways: GatewayResolver,
    ) -> Self {
        Self {
            counters: Arc::new(CounterCollector::new(paths.clone())),
            paths,
            hardware: Arc::new(hardware),
            software: Arc::new(software),
            gateways,
        }
    }

    /// Wire host-backed collectors from settings, reading routes over netlink.
    pub fn from_settings(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Self {
        let routes = NetlinkRouteSource::new().with_timeout(settings.effective_command_timeout());
        Self::with_route_source(settings, runner, Arc::new(routes))
    }

    /// Like [`Self::from_settings`] with an explicit routing source.
    pub fn with_route_source(
        settings: &Settings,
        runner: Arc<dyn CommandRunner>,
        routes: Arc<dyn RouteSource>,
    ) -> Self {
        let paths = HostPaths::from_settings(settings);
        let timeout = settings.effective_command_timeout();
        let links: Arc<dyn LinkInspector> = Arc::new(SysfsLinkInspector::new(paths.clone()));
        let gateways = GatewayResolver::with_ttl(links, routes, settings.effective_gateway_ttl());

        Self::new(
            paths.clone(),
            HardwareCollector::new(paths.clone(), Arc::clone(&runner))
                .with_timeout(timeout)
                .with_mrr_fix(settings.effective_fix_pcie_mrr()),
            SoftwareCollector::new(paths, runner).with_timeout(timeout),
            gateways,
        )
    }

    pub const fn gateways(&self) -> &GatewayResolver {
        &self.gateways
    }

    pub const fn paths(&self) -> &HostPaths {
        &self.paths
    }

    /// Collect hardware, software and counters for every physical adapter.
    pub async fn collect(&self) -> Result<InfinibandSnapshot, CollectError> {
        let ib_devs = physical_ib_devs(&self.paths)?;
        info!(count = ib_devs.len(), "collecting adapter state");

        let software = {
            let software = Arc::clone(&self.software);
            tokio::spawn(async move { software.collect().await })
        };
        let nic_role = if ib_devs.is_empty() {
            NicRole::Unknown
        } else {
            self.hardware.nic_role().await
        };

        let mut tasks = JoinSet::new();
        for ib_dev in ib_devs {
            let this = self.clone();
            tasks.spawn(async move { this.collect_one(&ib_dev, nic_role).await });
        }

        let pci_functions = scan_pci_adapters(&self.paths).unwrap_or_else(|e| {
            warn!(error = %e, "PCI scan failed, lost adapters cannot be detected");
            Vec::new()
        });

        let mut snapshot = InfinibandSnapshot {
            nic_role,
            pci_functions,
            collected_at: chrono::Utc::now(),
            ..InfinibandSnapshot::default()
        };
        while let Some(joined) = tasks.join_next().await {
            let (adapter, counters) = joined?;
            snapshot.counters.insert(adapter.ib_dev.clone(), counters);
            snapshot.adapters.push(adapter);
        }
        snapshot.adapters.sort_by(|a, b| a.ib_dev.cmp(&b.ib_dev));
        snapshot.software = software.await?;

        debug!(adapters = snapshot.adapters.len(), "collection finished");
        Ok(snapshot)
    }

    async fn collect_one(
        &self,
        ib_dev: &str,
        nic_role: NicRole,
    ) -> (AdapterState, hcacheck_core::CounterMap) {
        let mut adapter = self.hardware.collect_adapter(ib_dev, nic_role).await;
        if adapter.net_dev.is_empty() {
            adapter.gateway_error = "no net device".to_string();
        } else {
            match self.gateways.resolve(&adapter.net_dev).await {
                Ok(resolution) => adapter.gateway = Some(resolution),
                Err(e) => {
                    warn!(%ib_dev, iface = %adapter.net_dev, error = %e, "gateway lookup failed");
                    adapter.gateway_error = e.to_string();
                }
            }
        }
        let counters = self.counters.collect(ib_dev).await;
        (adapter, counters)
    }

    /// Drop cached gateway lookups.
    pub async fn close(&self) {
        self.gateways.close().await;
    }
}
