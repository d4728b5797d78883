//! Per-adapter hardware facts.
//!
//! Most values come straight from sysfs. PCIe Max-Read-Request, the NIC role
//! and the VF count need `lspci`, `rdma` and `ip`.
//!
//! Reading the MRR is not side-effect free: when it is not 4096 bytes and
//! auto-correction is enabled, the collector rewrites the PCIe Device Control
//! register through `setpci` and logs the change.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use hcacheck_core::ports::{CommandRequest, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use hcacheck_core::{AdapterState, LinkLayer, NicRole};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::CollectError;
use crate::host::{HostPaths, read_attr, read_attr_or_empty};
use crate::netdev::ib_dev_to_net_dev;

/// MRR value the fabric is tuned for.
pub const EXPECTED_MRR: &str = "4096";

/// Device Control register offset and the MRR encoding for 4096 bytes.
const DEVCTL_REGISTER: &str = "68.w";
const MRR_4096_CODE: u16 = 5;

static BDF_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{4}:[0-9a-fA-F]{2}:[0-9a-fA-F]{2}\.[0-7]\b").ok()
});

/// Collects [`AdapterState`] for one RDMA device at a time.
pub struct HardwareCollector {
    paths: HostPaths,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    fix_mrr: bool,
}

impl HardwareCollector {
    pub fn new(paths: HostPaths, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            paths,
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            fix_mrr: true,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable rewriting a wrong MRR.
    #[must_use]
    pub const fn with_mrr_fix(mut self, enabled: bool) -> Self {
        self.fix_mrr = enabled;
        self
    }

    fn request<I, S>(&self, program: &str, args: I) -> CommandRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandRequest::new(program, args).with_timeout(self.timeout)
    }

    /// Everything known about `ib_dev`. Unreadable attributes are left empty.
    pub async fn collect_adapter(&self, ib_dev: &str, role: NicRole) -> AdapterState {
        let dev = self.paths.ib_dev(ib_dev);
        let pci = dev.join("device");
        let port = dev.join("ports/1");
        let net_dev = ib_dev_to_net_dev(&self.paths, ib_dev);
        let bdf = pcie_bdf(&pci);
        let (pcie_tree_speed, pcie_tree_width) = self.pcie_tree_min(&bdf);

        let mut state = AdapterState {
            ib_dev: ib_dev.to_string(),
            hca_type: read_attr_or_empty(&dev.join("hca_type")),
            board_id: read_attr_or_empty(&dev.join("board_id")),
            device_id: read_attr_or_empty(&pci.join("device")),
            fw_ver: read_attr_or_empty(&dev.join("fw_ver")),
            vpd: read_vpd(&pci.join("vpd")),
            system_guid: read_attr_or_empty(&dev.join("sys_image_guid")),
            node_guid: read_attr_or_empty(&dev.join("node_guid")),
            phy_state: read_attr_or_empty(&port.join("phys_state")),
            port_state: read_attr_or_empty(&port.join("state")),
            link_layer: LinkLayer::from_port_attr(&read_attr_or_empty(&port.join("link_layer"))),
            port_speed: read_attr_or_empty(&port.join("rate")),
            pcie_speed: read_attr_or_empty(&pci.join("current_link_speed")),
            pcie_width: read_attr_or_empty(&pci.join("current_link_width")),
            pcie_tree_speed,
            pcie_tree_width,
            numa_node: read_attr_or_empty(&pci.join("numa_node")),
            cpu_list: read_attr_or_empty(&pci.join("local_cpulist")),
            vf_spec: read_attr_or_empty(&pci.join("sriov_totalvfs")),
            ..AdapterState::default()
        };

        if !net_dev.is_empty() {
            state.net_operstate = read_attr_or_empty(&self.paths.net_dev(&net_dev).join("operstate"));
        }
        if !bdf.is_empty() {
            state.pcie_mrr = match self.pcie_mrr(&bdf).await {
                Ok(mrr) => mrr,
                Err(e) => {
                    warn!(%ib_dev, %bdf, error = %e, "failed to read PCIe MaxReadReq");
                    String::new()
                }
            };
        }
        if role == NicRole::Sriov && !net_dev.is_empty() {
            state.vf_num = self.vf_num(&net_dev, &bdf).await;
        }
        state.net_dev = net_dev;
        state.pcie_bdf = bdf;
        state
    }

    /// Current MRR in bytes, corrected to [`EXPECTED_MRR`] when enabled.
    pub async fn pcie_mrr(&self, bdf: &str) -> Result<String, CollectError> {
        let stdout = self
            .runner
            .stdout(self.request("lspci", ["-s", bdf, "-vvv"]))
            .await?;
        let mrr = parse_max_read_req(&stdout).ok_or_else(|| CollectError::Parse {
            what: format!("lspci output for {bdf}"),
            reason: "no MaxReadReq field".to_string(),
        })?;
        if mrr == EXPECTED_MRR || !self.fix_mrr {
            return Ok(mrr);
        }

        warn!(%bdf, current = %mrr, "PCIe MaxReadReq is not {EXPECTED_MRR}, rewriting");
        match self.fix_pcie_mrr(bdf).await {
            Ok(()) => {
                info!(%bdf, from = %mrr, to = EXPECTED_MRR, "PCIe MaxReadReq corrected");
                Ok(EXPECTED_MRR.to_string())
            }
            Err(e) => {
                warn!(%bdf, error = %e, "failed to correct PCIe MaxReadReq");
                Ok(mrr)
            }
        }
    }

    /// Set MRR bits [14:12] of the Device Control register to 4096 bytes.
    async fn fix_pcie_mrr(&self, bdf: &str) -> Result<(), CollectError> {
        let current = self.read_devctl(bdf).await?;
        let written = (current & 0x0FFF) | (MRR_4096_CODE << 12);
        self.runner
            .stdout(self.request(
                "setpci",
                ["-s".to_string(), bdf.to_string(), format!("{DEVCTL_REGISTER}={written:04x}")],
            ))
            .await?;

        let actual = self.read_devctl(bdf).await?;
        if actual == written {
            Ok(())
        } else {
            Err(CollectError::MrrNotApplied {
                bdf: bdf.to_string(),
                written,
                actual,
            })
        }
    }

    async fn read_devctl(&self, bdf: &str) -> Result<u16, CollectError> {
        let stdout = self
            .runner
            .stdout(self.request("setpci", ["-s", bdf, DEVCTL_REGISTER]))
            .await?;
        let text = stdout.trim();
        u16::from_str_radix(text, 16).map_err(|e| CollectError::Parse {
            what: format!("Device Control register of {bdf}"),
            reason: format!("'{text}': {e}"),
        })
    }

    /// Host-wide RDMA netns mode from `rdma system`.
    pub async fn nic_role(&self) -> NicRole {
        match self.runner.stdout(self.request("rdma", ["system"])).await {
            Ok(stdout) => parse_nic_role(&stdout),
            Err(e) => {
                warn!(error = %e, "failed to query rdma system mode");
                NicRole::Unknown
            }
        }
    }

    /// Configured VFs of `net_dev`, as a decimal string.
    async fn vf_num(&self, net_dev: &str, bdf: &str) -> String {
        // VFs hang off the first function only.
        if bdf.ends_with(".1") {
            return "0".to_string();
        }
        match self
            .runner
            .stdout(self.request("ip", ["link", "show", "dev", net_dev]))
            .await
        {
            Ok(stdout) => count_vfs(&stdout).to_string(),
            Err(e) => {
                warn!(iface = %net_dev, error = %e, "failed to list VFs");
                String::new()
            }
        }
    }

    /// Slowest link speed and narrowest width among the upstream bridges of `bdf`.
    ///
    /// Both are empty when the device sits directly on a root port.
    pub fn pcie_tree_min(&self, bdf: &str) -> (String, String) {
        if bdf.is_empty() {
            return (String::new(), String::new());
        }
        let link = self.paths.pci_devices().join(bdf);
        let target = match std::fs::read_link(&link) {
            Ok(target) => target,
            Err(e) => {
                debug!(%bdf, error = %e, "cannot resolve PCI device path");
                return (String::new(), String::new());
            }
        };
        let upstream = upstream_bdfs(&target.to_string_lossy(), bdf);
        if upstream.is_empty() {
            debug!(%bdf, "no upstream bridges");
            return (String::new(), String::new());
        }

        let root = self.paths.pci_devices();
        let min_of = |attr: &str| {
            upstream
                .iter()
                .filter_map(|up| first_number(&read_attr_or_empty(&root.join(up).join(attr))))
                .reduce(f64::min)
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        (min_of("current_link_speed"), min_of("current_link_width"))
    }
}

/// BDF from the `PCI_SLOT_NAME` line of the device's uevent file.
fn pcie_bdf(pci_dir: &Path) -> String {
    read_attr(&pci_dir.join("uevent"))
        .ok()
        .and_then(|uevent| {
            uevent
                .lines()
                .find_map(|line| line.strip_prefix("PCI_SLOT_NAME="))
                .map(|bdf| bdf.trim().to_string())
        })
        .unwrap_or_default()
}

/// Printable characters of the binary VPD blob.
fn read_vpd(path: &Path) -> String {
    std::fs::read(path)
        .map(|bytes| {
            bytes
                .iter()
                .filter(|b| b.is_ascii_graphic() || **b == b' ')
                .map(|b| char::from(*b))
                .collect::<String>()
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

/// Bridges between the root complex and `bdf`, excluding `bdf` itself.
fn upstream_bdfs(device_path: &str, bdf: &str) -> Vec<String> {
    let Some(re) = BDF_RE.as_ref() else {
        return Vec::new();
    };
    re.find_iter(device_path)
        .map(|m| m.as_str().to_string())
        .filter(|found| found != bdf)
        .collect()
}

fn first_number(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}

/// The value following `MaxReadReq` in `lspci -vvv` output.
fn parse_max_read_req(lspci: &str) -> Option<String> {
    lspci.lines().find_map(|line| {
        let (_, rest) = line.split_once("MaxReadReq ")?;
        rest.split_whitespace().next().map(str::to_string)
    })
}

fn parse_nic_role(rdma_system: &str) -> NicRole {
    if rdma_system.contains("exclusive") {
        NicRole::Sriov
    } else if rdma_system.contains("shared") {
        NicRole::Macvlan
    } else {
        NicRole::Unknown
    }
}

/// VF lines with a real MAC address in `ip link show` output.
fn count_vfs(ip_link: &str) -> usize {
    ip_link
        .lines()
        .filter(|line| line.trim_start().starts_with("vf ") && !line.contains("00:00:00:00:00:00"))
        .count()
}
