//! Remote specification store port.
//!
//! The store serves `<base-url>/<component>/<key>.yaml` documents and whole
//! spec files. Every failure here is recoverable from the resolver's point
//! of view: it logs and moves on to the next source.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the remote spec store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecStoreError {
    /// No base URL is configured, so relative lookups are impossible.
    #[error("No remote spec store configured")]
    NotConfigured,

    #[error("Remote spec {url} not found (status {status})")]
    NotFound { url: String, status: u16 },

    #[error("Remote spec {url} is not valid YAML: {reason}")]
    InvalidDocument { url: String, reason: String },

    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid spec store URL '{0}'")]
    InvalidUrl(String),
}

/// Remote specification store.
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Fetch the body of `<base-url>/<component>/<key>.yaml`.
    ///
    /// Any non-success status or unparseable body is an error.
    async fn fetch_document(&self, component: &str, key: &str) -> Result<String, SpecStoreError>;

    /// Download an absolute URL into `dest_dir`, keeping its file name.
    ///
    /// The body is written to a temp file beside the target and renamed into place.
    async fn download_url(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, SpecStoreError>;

    /// Download `<base-url>/<file_name>` into `dest_dir`.
    async fn download_named(
        &self,
        file_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, SpecStoreError>;
}

/// Store used when no remote is configured. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpecStore;

#[async_trait]
impl SpecStore for NoopSpecStore {
    async fn fetch_document(&self, _component: &str, _key: &str) -> Result<String, SpecStoreError> {
        Err(SpecStoreError::NotConfigured)
    }

    async fn download_url(&self, _url: &str, _dest_dir: &Path) -> Result<PathBuf, SpecStoreError> {
        Err(SpecStoreError::NotConfigured)
    }

    async fn download_named(
        &self,
        _file_name: &str,
        _dest_dir: &Path,
    ) -> Result<PathBuf, SpecStoreError> {
        Err(SpecStoreError::NotConfigured)
    }
}

/// Whether `name` should be fetched over HTTP rather than read from disk.
pub fn is_remote_location(name: &str) -> bool {
    name.starts_with("http://") || name.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_location_detection() {
        assert!(is_remote_location("https://specs.example.com/a_spec.yaml"));
        assert!(is_remote_location("http://10.0.0.1/a_spec.yaml"));
        assert!(!is_remote_location("/etc/hcacheck/a_spec.yaml"));
        assert!(!is_remote_location("a_spec.yaml"));
    }

    #[tokio::test]
    async fn test_noop_store_always_misses() {
        let store = NoopSpecStore;
        assert_eq!(
            store.fetch_document("hca", "MT_1").await,
            Err(SpecStoreError::NotConfigured)
        );
        assert!(store.download_named("x_spec.yaml", Path::new("/tmp")).await.is_err());
    }
}
