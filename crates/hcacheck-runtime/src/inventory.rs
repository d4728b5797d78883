//! Adapter discovery from sysfs.

use std::collections::BTreeMap;
use std::path::Path;

use hcacheck_core::PciFunction;
use hcacheck_core::ports::{AdapterInventory, InventoryError};
use tracing::{debug, warn};

use crate::host::{HostPaths, list_dir, read_attr, read_attr_or_empty};

/// PCI vendor ID of Mellanox/NVIDIA networking.
pub const MELLANOX_VENDOR_ID: &str = "0x15b3";

/// PCI vendor ID of NVIDIA GPUs.
pub const NVIDIA_VENDOR_ID: &str = "0x10de";

/// Device IDs of supported ConnectX/BlueField functions.
pub const SUPPORTED_DEVICE_IDS: &[&str] = &[
    "0x101b", "0x101d", "0x1021", "0x1023", "0xa2dc", "0x09a2", "0x2330", "0x4128", "0x02b2",
];

/// Name fragments of RDMA devices that are not physical adapters.
pub const EXCLUDED_NAME_FRAGMENTS: &[&str] = &["bond", "mezz"];

/// Whether an RDMA device name belongs to a bonding or management device.
pub fn is_excluded_name(ib_dev: &str) -> bool {
    EXCLUDED_NAME_FRAGMENTS
        .iter()
        .any(|fragment| ib_dev.contains(fragment))
}

/// Physical-function RDMA devices in name order.
///
/// Virtual functions (`device/physfn` present) and excluded names are skipped.
pub fn physical_ib_devs(paths: &HostPaths) -> Result<Vec<String>, InventoryError> {
    let class = paths.infiniband_class();
    let names = list_dir(&class).map_err(|e| InventoryError::Enumerate {
        path: class.display().to_string(),
        reason: e.to_string(),
    })?;

    Ok(names
        .into_iter()
        .filter(|name| {
            if paths.ib_dev(name).join("device/physfn").exists() {
                debug!(ib_dev = %name, "skipping virtual function");
                return false;
            }
            if is_excluded_name(name) {
                debug!(ib_dev = %name, "skipping excluded device");
                return false;
            }
            true
        })
        .collect())
}

/// Board IDs read from `/sys/class/infiniband/*/board_id`.
#[derive(Debug, Clone, Default)]
pub struct SysfsInventory {
    paths: HostPaths,
}

impl SysfsInventory {
    pub const fn new(paths: HostPaths) -> Self {
        Self { paths }
    }

    /// Board ID of each physical RDMA device.
    pub fn board_ids_by_device(&self) -> Result<BTreeMap<String, String>, InventoryError> {
        let mut map = BTreeMap::new();
        for ib_dev in physical_ib_devs(&self.paths)? {
            let path = self.paths.ib_dev(&ib_dev).join("board_id");
            match read_attr(&path) {
                Ok(board_id) if !board_id.is_empty() => {
                    map.insert(ib_dev, board_id);
                }
                Ok(_) => warn!(%ib_dev, "empty board_id"),
                Err(e) => warn!(%ib_dev, error = %e, "failed to read board_id"),
            }
        }
        Ok(map)
    }
}

impl AdapterInventory for SysfsInventory {
    fn present_board_ids(&self) -> Result<Vec<String>, InventoryError> {
        let mut ids: Vec<String> = Vec::new();
        for board_id in self.board_ids_by_device()?.into_values() {
            if !ids.contains(&board_id) {
                ids.push(board_id);
            }
        }
        Ok(ids)
    }
}

/// Scan `/sys/bus/pci/devices` for supported adapter functions.
///
/// Every function with a supported vendor and device ID is returned, along
/// with the RDMA devices under its `infiniband/` child. A function without
/// any is reported with an empty list so lost adapters stay visible.
pub fn scan_pci_adapters(paths: &HostPaths) -> Result<Vec<PciFunction>, InventoryError> {
    let root = paths.pci_devices();
    let entries = list_dir(&root).map_err(|e| InventoryError::Enumerate {
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut found = Vec::new();
    for bdf in entries {
        let dir = root.join(&bdf);
        let vendor_id = read_attr_or_empty(&dir.join("vendor"));
        if vendor_id != MELLANOX_VENDOR_ID {
            continue;
        }
        let device_id = read_attr_or_empty(&dir.join("device"));
        if !SUPPORTED_DEVICE_IDS.contains(&device_id.as_str()) {
            continue;
        }
        let ib_devs = list_dir(&dir.join("infiniband")).unwrap_or_default();
        if ib_devs.is_empty() {
            warn!(%bdf, "supported function has no RDMA device");
        }
        found.push(PciFunction {
            bdf,
            vendor_id,
            device_id,
            ib_devs,
        });
    }
    debug!(count = found.len(), "finished PCI scan");
    Ok(found)
}

/// Whether any NVIDIA display or 3D controller is present.
pub fn has_nvidia_gpu(paths: &HostPaths) -> bool {
    let root = paths.pci_devices();
    let Ok(entries) = list_dir(&root) else {
        return false;
    };
    entries.iter().any(|bdf| is_nvidia_gpu(&root.join(bdf)))
}

fn is_nvidia_gpu(dir: &Path) -> bool {
    // Class 0x03xxxx is a display controller.
    read_attr_or_empty(&dir.join("vendor")) == NVIDIA_VENDOR_ID
        && read_attr_or_empty(&dir.join("class")).starts_with("0x03")
}
