//! Live adapter state as collected from the host.
//!
//! These are plain data types. Collection lives in `hcacheck-runtime`;
//! comparison against the expected state lives in [`crate::checks`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::gateway::GatewayResolution;

/// Counter name to value, merged across counter families.
pub type CounterMap = BTreeMap<String, u64>;

/// Identity of one physical adapter.
///
/// The board ID is the join key between expected and live state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdapterIdentity {
    /// Vendor-stamped board identifier (PSID), e.g. `MT_0000000970`.
    pub board_id: String,
    /// PCI bus-device-function address, e.g. `0000:1a:00.0`.
    pub bdf: String,
    /// Logical RDMA device name, e.g. `mlx5_0`.
    pub ib_dev: String,
}

/// Link layer of an adapter port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LinkLayer {
    InfiniBand,
    Ethernet,
    #[default]
    Unknown,
}

impl LinkLayer {
    /// Map a net device `type` attribute (ARPHRD value) to a link layer.
    pub fn from_arphrd(value: &str) -> Self {
        match value.trim() {
            "1" => Self::Ethernet,
            "32" => Self::InfiniBand,
            _ => Self::Unknown,
        }
    }

    /// Map the RDMA port `link_layer` attribute to a link layer.
    pub fn from_port_attr(value: &str) -> Self {
        match value.trim() {
            "InfiniBand" => Self::InfiniBand,
            "Ethernet" => Self::Ethernet,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InfiniBand => "InfiniBand",
            Self::Ethernet => "Ethernet",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for LinkLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role the NIC plays for container networking, from `rdma system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NicRole {
    /// Exclusive netns mode; VFs are handed to workloads.
    Sriov,
    /// Shared netns mode; macvlan on top of the PF.
    Macvlan,
    #[default]
    Unknown,
}

/// Hardware facts for one adapter.
///
/// Fields are strings as read from sysfs so that a missing attribute shows
/// up as an empty value rather than failing the whole collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterState {
    pub ib_dev: String,
    pub net_dev: String,
    pub hca_type: String,
    pub board_id: String,
    pub device_id: String,
    pub fw_ver: String,
    pub vpd: String,
    pub system_guid: String,
    pub node_guid: String,
    pub phy_state: String,
    pub port_state: String,
    pub link_layer: LinkLayer,
    pub port_speed: String,
    pub net_operstate: String,
    pub pcie_bdf: String,
    pub pcie_speed: String,
    pub pcie_width: String,
    pub pcie_tree_speed: String,
    pub pcie_tree_width: String,
    pub pcie_mrr: String,
    pub numa_node: String,
    pub cpu_list: String,
    /// `None` when the lookup failed; see `gateway_error`.
    pub gateway: Option<GatewayResolution>,
    pub gateway_error: String,
    pub vf_spec: String,
    pub vf_num: String,
}

impl AdapterState {
    pub fn identity(&self) -> AdapterIdentity {
        AdapterIdentity {
            board_id: self.board_id.clone(),
            bdf: self.pcie_bdf.clone(),
            ib_dev: self.ib_dev.clone(),
        }
    }
}

/// Host-wide RDMA software facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareState {
    pub ofed_ver: String,
    /// Kernel modules from the expected set that are loaded.
    pub kernel_modules: Vec<String>,
}

/// A supported adapter function found on the PCI bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciFunction {
    pub bdf: String,
    pub vendor_id: String,
    pub device_id: String,
    /// RDMA devices the driver registered for this function. Empty when the
    /// adapter is on the bus but lost to the RDMA stack.
    pub ib_devs: Vec<String>,
}

impl PciFunction {
    pub fn is_lost(&self) -> bool {
        self.ib_devs.is_empty()
    }
}

/// Everything one collection pass produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfinibandSnapshot {
    pub nic_role: NicRole,
    pub adapters: Vec<AdapterState>,
    /// Result of the PCI bus scan, independent of the RDMA device list.
    #[serde(default)]
    pub pci_functions: Vec<PciFunction>,
    pub software: SoftwareState,
    /// Counters keyed by RDMA device name.
    pub counters: BTreeMap<String, CounterMap>,
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl InfinibandSnapshot {
    pub fn adapter(&self, ib_dev: &str) -> Option<&AdapterState> {
        self.adapters.iter().find(|a| a.ib_dev == ib_dev)
    }
}
