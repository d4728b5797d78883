//! Specification documents and the resolved per-host specification.
//!
//! A specification document is YAML with one top-level key per component:
//!
//! ```yaml
//! infiniband:
//!   <cluster>:
//!     ib_devs: { mlx5_0: ib0 }
//!     sw_deps: { ofed_ver: ">=MLNX_OFED_LINUX-23.10-1.1.9.0", kernel_module: [mlx5_core] }
//!     pcie_acs: disable
//!     hca_specs:
//!       MT_0000000970: { hardware: { board_id: MT_0000000970, fw_ver: "28.39.1002" }, perf: {} }
//! hca:
//!   MT_0000000970: { hardware: { ... }, perf: { one_way_bw: 360, avg_latency_us: 10 } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::merge::merge_fill_gaps;

/// Component key of the cluster-keyed network specification.
pub const INFINIBAND_COMPONENT: &str = "infiniband";

/// Component key of the global per-board hardware catalog.
pub const HCA_COMPONENT: &str = "hca";

/// Cluster entry used when the host's own cluster has none.
pub const DEFAULT_CLUSTER: &str = "default";

/// Expected hardware state of one adapter model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSpec {
    pub board_id: String,
    pub hca_type: String,
    /// Firmware constraint, e.g. `>=28.39.1002` or `28.39.*`.
    pub fw_ver: String,
    pub phy_state: String,
    pub port_state: String,
    pub port_speed: String,
    pub link_layer: String,
    pub net_operstate: String,
    pub pcie_speed: String,
    pub pcie_width: String,
    pub pcie_tree_speed: String,
    pub pcie_tree_width: String,
    pub pcie_mrr: String,
    /// `sriov_totalvfs` expected on SR-IOV nodes.
    pub vf_spec: String,
    /// Accepted configured VF counts on SR-IOV nodes.
    pub vf_num: Vec<String>,
}

/// Expected performance of one adapter model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfSpec {
    /// One-way bandwidth in Gbps.
    pub one_way_bw: f64,
    /// Average latency in microseconds.
    pub avg_latency_us: f64,
}

/// Hardware and performance expectations for one board ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSpec {
    pub hardware: HardwareSpec,
    pub perf: PerfSpec,
}

impl AdapterSpec {
    /// Whether this entry carries its own identity and that identity is `board_id`.
    pub fn is_bound_to(&self, board_id: &str) -> bool {
        self.hardware.board_id == board_id
    }

    /// Whether this entry names a different board than the key it is stored under.
    pub fn is_stale_for(&self, board_id: &str) -> bool {
        !self.hardware.board_id.is_empty() && self.hardware.board_id != board_id
    }
}

/// Required RDMA software stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareDeps {
    /// OFED constraint, e.g. `>=MLNX_OFED_LINUX-23.10-1.1.9.0`.
    pub ofed_ver: String,
    pub kernel_module: Vec<String>,
    pub libraries: Vec<String>,
    pub tools: Vec<String>,
}

/// One cluster's entry in the `infiniband` component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSpec {
    /// RDMA device to net device naming map.
    pub ib_devs: BTreeMap<String, String>,
    pub sw_deps: SoftwareDeps,
    pub pcie_acs: String,
    pub hca_specs: BTreeMap<String, AdapterSpec>,
}

/// A whole specification document as stored on disk or remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecDocument {
    pub infiniband: BTreeMap<String, ClusterSpec>,
    pub hca: BTreeMap<String, AdapterSpec>,
}

impl SpecDocument {
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes to unit, not to an empty mapping.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Read and parse a document from disk.
    pub async fn load(path: &Path) -> Result<Self, SpecLoadError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SpecLoadError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_yaml_str(&text).map_err(|e| SpecLoadError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Merge a lower-priority document into this one. Existing keys win.
    pub fn fill_gaps_from(&mut self, lower: Self) {
        merge_fill_gaps(&mut self.infiniband, lower.infiniband);
        merge_fill_gaps(&mut self.hca, lower.hca);
    }

    pub fn is_empty(&self) -> bool {
        self.infiniband.is_empty() && self.hca.is_empty()
    }
}

/// Failure to read or parse one specification source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpecLoadError {
    #[error("Failed to read spec file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse spec file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// The specification bound to the adapters present on this host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSpec {
    /// Cluster entry that was selected (may be `default`).
    pub cluster: String,
    /// Local file the cluster document was loaded from.
    pub source: Option<PathBuf>,
    pub ib_devs: BTreeMap<String, String>,
    pub sw_deps: SoftwareDeps,
    pub pcie_acs: String,
    /// One entry per board ID present on the host.
    pub adapters: BTreeMap<String, AdapterSpec>,
}

impl ResolvedSpec {
    pub fn adapter(&self, board_id: &str) -> Option<&AdapterSpec> {
        self.adapters.get(board_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
infiniband:
  default:
    ib_devs:
      mlx5_0: ib0
    sw_deps:
      ofed_ver: ">=MLNX_OFED_LINUX-23.10-1.1.9.0"
      kernel_module: [mlx5_core, ib_core]
    pcie_acs: disable
    hca_specs:
      MT_0000000970:
        hardware:
          board_id: MT_0000000970
          fw_ver: "28.39.1002"
hca:
  MT_0000000838:
    hardware:
      board_id: MT_0000000838
      port_speed: "400 Gb/sec (4X NDR)"
    perf:
      one_way_bw: 360
      avg_latency_us: 10
"#;

    #[test]
    fn test_parse_full_document() {
        let doc = SpecDocument::from_yaml_str(SAMPLE).unwrap();
        let cluster = &doc.infiniband["default"];
        assert_eq!(cluster.ib_devs["mlx5_0"], "ib0");
        assert_eq!(cluster.sw_deps.kernel_module.len(), 2);
        assert_eq!(cluster.pcie_acs, "disable");
        assert_eq!(cluster.hca_specs["MT_0000000970"].hardware.fw_ver, "28.39.1002");

        let hca = &doc.hca["MT_0000000838"];
        assert!((hca.perf.one_way_bw - 360.0).abs() < f64::EPSILON);
        assert!(hca.is_bound_to("MT_0000000838"));
    }

    #[test]
    fn test_empty_document_parses() {
        assert!(SpecDocument::from_yaml_str("").unwrap().is_empty());
        assert!(SpecDocument::from_yaml_str("   \n").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_components_are_ignored() {
        let doc = SpecDocument::from_yaml_str("nvidia:\n  foo: bar\n").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_stale_detection() {
        let mut spec = AdapterSpec::default();
        assert!(!spec.is_stale_for("MT_1"));
        assert!(!spec.is_bound_to("MT_1"));

        spec.hardware.board_id = "MT_2".to_string();
        assert!(spec.is_stale_for("MT_1"));
        assert!(!spec.is_stale_for("MT_2"));
    }

    #[test]
    fn test_fill_gaps_keeps_existing_cluster() {
        let mut high = SpecDocument::from_yaml_str(SAMPLE).unwrap();
        let mut low = SpecDocument::default();
        low.infiniband.insert(
            "default".to_string(),
            ClusterSpec {
                pcie_acs: "enable".to_string(),
                ..ClusterSpec::default()
            },
        );
        low.infiniband
            .insert("hpc".to_string(), ClusterSpec::default());

        high.fill_gaps_from(low);
        assert_eq!(high.infiniband["default"].pcie_acs, "disable");
        assert!(high.infiniband.contains_key("hpc"));
    }

    #[tokio::test]
    async fn test_load_reports_parse_error_with_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken_spec.yaml");
        std::fs::write(&path, "infiniband: [unclosed").unwrap();

        let err = SpecDocument::load(&path).await.unwrap_err();
        assert!(matches!(err, SpecLoadError::Parse { .. }));
        assert!(err.to_string().contains("broken_spec.yaml"));
    }
}
