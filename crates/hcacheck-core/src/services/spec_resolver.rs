//! Specification resolution engine.
//!
//! Sources, highest priority first:
//! 1. The target file (explicit name, path or URL, else `<cluster>_spec.yaml`)
//! 2. The production default `default_spec.yaml` in the canonical directory
//! 3. Every `*_spec.yaml` in the development directory, in name order
//! 4. The remote store, one board ID at a time
//!
//! Sources are merged with fill-gaps semantics, so a key set by a higher
//! priority source is never overwritten. Unreadable or malformed sources
//! are logged and skipped. Only a board ID with no spec in any source is a
//! hard failure.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    AdapterSpec, ClusterSpec, DEFAULT_CLUSTER, HCA_COMPONENT, ResolvedSpec, SpecDocument,
};
use crate::paths::{self, DEFAULT_SPEC_FILE, SPEC_FILE_SUFFIX};
use crate::ports::{AdapterInventory, InventoryError, SpecStore, is_remote_location};
use crate::settings::Settings;

/// Errors that abort specification resolution.
#[derive(Debug, Clone, Error)]
pub enum SpecError {
    /// Neither the target nor the bundled default file could be found.
    #[error("Spec file '{target}' not found (searched: {})", display_paths(searched))]
    SpecFileNotFound {
        target: String,
        searched: Vec<PathBuf>,
    },

    /// No entry for the host's cluster and no `default` entry.
    #[error("No spec for cluster '{cluster}' and no 'default' entry")]
    NoClusterSpec { cluster: String },

    /// Board IDs present on the host that no source describes.
    #[error(
        "spec for the following board IDs not found in any source: {}",
        board_ids.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    )]
    MissingBoardSpecs { board_ids: BTreeSet<String> },

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Binds merged specification sources to the adapters on this host.
#[derive(Clone)]
pub struct SpecResolver {
    spec_dir: PathBuf,
    dev_spec_dir: PathBuf,
    store: Arc<dyn SpecStore>,
    inventory: Arc<dyn AdapterInventory>,
}

impl SpecResolver {
    pub fn new(
        spec_dir: impl Into<PathBuf>,
        dev_spec_dir: impl Into<PathBuf>,
        store: Arc<dyn SpecStore>,
        inventory: Arc<dyn AdapterInventory>,
    ) -> Self {
        Self {
            spec_dir: spec_dir.into(),
            dev_spec_dir: dev_spec_dir.into(),
            store,
            inventory,
        }
    }

    /// Build a resolver from the directory settings.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn SpecStore>,
        inventory: Arc<dyn AdapterInventory>,
    ) -> Self {
        Self::new(
            paths::resolve_spec_dir(settings).path,
            paths::resolve_dev_spec_dir(settings),
            store,
            inventory,
        )
    }

    pub fn spec_dir(&self) -> &Path {
        &self.spec_dir
    }

    pub fn dev_spec_dir(&self) -> &Path {
        &self.dev_spec_dir
    }

    /// Resolve the specification for the adapters present on this host.
    ///
    /// `explicit` may be a file name, a local path or an `http(s)` URL.
    /// Without it the target is derived from `host_identity`.
    pub async fn resolve(
        &self,
        explicit: Option<&str>,
        host_identity: &str,
    ) -> Result<ResolvedSpec, SpecError> {
        let cluster = paths::cluster_name(host_identity);
        let target = explicit.map_or_else(|| paths::spec_file_name(&cluster), str::to_string);
        debug!(%cluster, %target, "resolving specification");

        let primary = self.locate(&target).await?;
        let merged = self.load_merged(&primary).await;
        let (cluster_key, cluster_spec) = select_cluster(&merged, &cluster)?;

        let board_ids = self.inventory.present_board_ids()?;
        info!(
            cluster = %cluster_key,
            source = %primary.display(),
            boards = board_ids.len(),
            "binding specification to present adapters"
        );

        let mut adapters = BTreeMap::new();
        let mut missing = BTreeSet::new();
        for board_id in board_ids {
            match self.bind_board(&board_id, cluster_spec, &merged.hca).await {
                Some(spec) => {
                    adapters.insert(board_id, spec);
                }
                None => {
                    missing.insert(board_id);
                }
            }
        }

        if !missing.is_empty() {
            return Err(SpecError::MissingBoardSpecs { board_ids: missing });
        }

        Ok(ResolvedSpec {
            cluster: cluster_key,
            source: Some(primary),
            ib_devs: cluster_spec.ib_devs.clone(),
            sw_deps: cluster_spec.sw_deps.clone(),
            pcie_acs: cluster_spec.pcie_acs.clone(),
            adapters,
        })
    }

    /// Turn a target name into a readable local file.
    pub async fn locate(&self, target: &str) -> Result<PathBuf, SpecError> {
        let mut searched = Vec::new();

        if is_remote_location(target) {
            match self.store.download_url(target, &self.spec_dir).await {
                Ok(path) => {
                    info!(url = target, path = %path.display(), "downloaded spec file");
                    return Ok(path);
                }
                Err(e) => warn!(url = target, error = %e, "failed to download spec file"),
            }
        } else {
            let direct = PathBuf::from(target);
            if direct.is_file() {
                return Ok(direct);
            }
            searched.push(direct);
        }

        let file_name = Path::new(target)
            .file_name()
            .map_or_else(|| target.to_string(), |n| n.to_string_lossy().into_owned());
        let canonical = self.spec_dir.join(&file_name);
        if canonical.is_file() {
            return Ok(canonical);
        }
        searched.push(canonical);

        if !is_remote_location(target) {
            match self.store.download_named(&file_name, &self.spec_dir).await {
                Ok(path) => {
                    info!(file = %file_name, path = %path.display(), "downloaded spec file from remote store");
                    return Ok(path);
                }
                Err(e) => debug!(file = %file_name, error = %e, "spec file not available remotely"),
            }
        }

        let fallback = self.spec_dir.join(DEFAULT_SPEC_FILE);
        if fallback.is_file() {
            warn!(
                target,
                fallback = %fallback.display(),
                "spec file not found, using default spec"
            );
            return Ok(fallback);
        }
        searched.push(fallback);

        Err(SpecError::SpecFileNotFound {
            target: target.to_string(),
            searched,
        })
    }

    /// Load the primary document and fill its gaps from the default sources.
    pub async fn load_merged(&self, primary: &Path) -> SpecDocument {
        let mut merged = load_or_empty(primary).await;

        let production = self.spec_dir.join(DEFAULT_SPEC_FILE);
        if production != primary && production.is_file() {
            merged.fill_gaps_from(load_or_empty(&production).await);
        }

        if self.dev_spec_dir != self.spec_dir {
            for path in dev_spec_files(&self.dev_spec_dir) {
                if path != primary {
                    merged.fill_gaps_from(load_or_empty(&path).await);
                }
            }
        }

        merged
    }

    async fn bind_board(
        &self,
        board_id: &str,
        cluster: &ClusterSpec,
        catalog: &BTreeMap<String, AdapterSpec>,
    ) -> Option<AdapterSpec> {
        if let Some(spec) = cluster.hca_specs.get(board_id) {
            if spec.is_bound_to(board_id) {
                return Some(spec.clone());
            }
            if spec.is_stale_for(board_id) {
                warn!(
                    board_id,
                    recorded = %spec.hardware.board_id,
                    "cluster spec entry is bound to another board, refetching"
                );
            } else {
                debug!(board_id, "cluster spec entry has no identity, using catalog");
            }
        }

        if let Some(spec) = catalog.get(board_id) {
            if spec.is_stale_for(board_id) {
                warn!(
                    board_id,
                    recorded = %spec.hardware.board_id,
                    "catalog entry is bound to another board, ignoring"
                );
            } else {
                let mut spec = spec.clone();
                if spec.hardware.board_id.is_empty() {
                    spec.hardware.board_id = board_id.to_string();
                }
                return Some(spec);
            }
        }

        warn!(board_id, "spec not found locally, trying remote store");
        self.fetch_remote(board_id).await
    }

    async fn fetch_remote(&self, board_id: &str) -> Option<AdapterSpec> {
        let body = match self.store.fetch_document(HCA_COMPONENT, board_id).await {
            Ok(body) => body,
            Err(e) => {
                warn!(board_id, error = %e, "failed to load spec from remote store");
                return None;
            }
        };
        let document = match SpecDocument::from_yaml_str(&body) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(board_id, error = %e, "remote spec is not a valid document");
                return None;
            }
        };
        let Some(mut spec) = document.hca.get(board_id).cloned() else {
            warn!(board_id, "remote spec document does not describe this board");
            return None;
        };
        if spec.is_stale_for(board_id) {
            warn!(board_id, recorded = %spec.hardware.board_id, "remote spec is bound to another board");
            return None;
        }
        spec.hardware.board_id = board_id.to_string();
        info!(board_id, "loaded spec from remote store");
        Some(spec)
    }
}

fn select_cluster<'a>(
    document: &'a SpecDocument,
    cluster: &str,
) -> Result<(String, &'a ClusterSpec), SpecError> {
    if let Some(spec) = document.infiniband.get(cluster) {
        return Ok((cluster.to_string(), spec));
    }
    if let Some(spec) = document.infiniband.get(DEFAULT_CLUSTER) {
        debug!(cluster, "no cluster entry, using default");
        return Ok((DEFAULT_CLUSTER.to_string(), spec));
    }
    Err(SpecError::NoClusterSpec {
        cluster: cluster.to_string(),
    })
}

async fn load_or_empty(path: &Path) -> SpecDocument {
    match SpecDocument::load(path).await {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "skipping spec source");
            SpecDocument::default()
        }
    }
}

fn dev_spec_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "development spec directory unavailable");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(SPEC_FILE_SUFFIX))
        })
        .collect();
    files.sort();
    files
}
