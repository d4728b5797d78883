//! `SpecStore` port implementation over HTTP.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hcacheck_core::ports::{SpecStore, SpecStoreError};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::http::{HttpBackend, ReqwestBackend};

// ============================================================================
// Error Mapping
// ============================================================================

/// Convert internal `RemoteError` to core `SpecStoreError`.
fn map_error(err: RemoteError) -> SpecStoreError {
    match err {
        RemoteError::Status { status, url } => SpecStoreError::NotFound { url, status },
        RemoteError::Network(e) => SpecStoreError::Network {
            url: e.url().map(ToString::to_string).unwrap_or_default(),
            reason: e.to_string(),
        },
        RemoteError::InvalidUrl(e) => SpecStoreError::InvalidUrl(e.to_string()),
        RemoteError::NoFileName(url) => SpecStoreError::InvalidUrl(url),
        RemoteError::NoBaseUrl => SpecStoreError::NotConfigured,
        RemoteError::InvalidYaml { url, source } => SpecStoreError::InvalidDocument {
            url,
            reason: source.to_string(),
        },
        RemoteError::Io { path, source } => SpecStoreError::Io {
            path,
            reason: source.to_string(),
        },
    }
}

// ============================================================================
// Store
// ============================================================================

/// Remote spec store generic over its HTTP backend.
pub struct HttpSpecStore<B: HttpBackend = ReqwestBackend> {
    backend: B,
    base_url: Option<Url>,
}

/// The store used in production.
pub type DefaultSpecStore = HttpSpecStore<ReqwestBackend>;

impl HttpSpecStore<ReqwestBackend> {
    /// Build a reqwest-backed store from configuration.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, SpecStoreError> {
        let backend = ReqwestBackend::new(config).map_err(map_error)?;
        Self::with_backend(backend, config.base_url()).map_err(map_error)
    }
}

impl<B: HttpBackend> HttpSpecStore<B> {
    pub fn with_backend(backend: B, base_url: Option<&str>) -> RemoteResult<Self> {
        let base_url = base_url.map(parse_base_url).transpose()?;
        Ok(Self { backend, base_url })
    }

    pub const fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    fn relative(&self, path: &str) -> RemoteResult<Url> {
        let base = self.base_url.as_ref().ok_or(RemoteError::NoBaseUrl)?;
        Ok(base.join(path)?)
    }

    /// Fetch `url` and make sure the body parses as YAML.
    async fn fetch_yaml(&self, url: &Url) -> RemoteResult<String> {
        let body = self.backend.get_text(url).await?;
        serde_yaml::from_str::<serde_yaml::Value>(&body).map_err(|source| {
            RemoteError::InvalidYaml {
                url: url.to_string(),
                source,
            }
        })?;
        Ok(body)
    }

    async fn download(&self, url: &Url, dest_dir: &Path) -> RemoteResult<PathBuf> {
        let file_name = file_name(url)?;
        let body = self.fetch_yaml(url).await?;
        let path = write_atomic(dest_dir, &file_name, &body).await?;
        info!(%url, path = %path.display(), "downloaded spec file");
        Ok(path)
    }
}

/// Parse a base URL so that relative joins append to its path.
fn parse_base_url(raw: &str) -> RemoteResult<Url> {
    let raw = raw.trim();
    if raw.ends_with('/') {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("{raw}/"))?)
    }
}

fn file_name(url: &Url) -> RemoteResult<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RemoteError::NoFileName(url.to_string()))
}

/// Write `contents` to `<dir>/<name>` through a uniquely named temp file.
///
/// Concurrent writers of the same name each get their own temp file, and
/// readers never observe a partially written spec.
async fn write_atomic(dir: &Path, name: &str, contents: &str) -> RemoteResult<PathBuf> {
    let dir = dir.to_path_buf();
    let final_path = dir.join(name);
    let target = final_path.clone();
    let contents = contents.to_string();

    tokio::task::spawn_blocking(move || persist(&dir, &target, contents.as_bytes()))
        .await
        .map_err(|e| RemoteError::Io {
            path: final_path.clone(),
            source: std::io::Error::other(e),
        })??;
    Ok(final_path)
}

fn persist(dir: &Path, target: &Path, contents: &[u8]) -> RemoteResult<()> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| RemoteError::Io { path, source }
    };

    std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    let mut temp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    temp.write_all(contents).map_err(io_err(temp.path()))?;
    temp.as_file().sync_all().map_err(io_err(temp.path()))?;
    // A failed persist drops the temp file, which removes it.
    temp.persist(target).map_err(|e| {
        debug!(path = %target.display(), error = %e.error, "failed to move spec into place");
        RemoteError::Io {
            path: target.to_path_buf(),
            source: e.error,
        }
    })?;
    Ok(())
}

#[async_trait]
impl<B: HttpBackend> SpecStore for HttpSpecStore<B> {
    async fn fetch_document(&self, component: &str, key: &str) -> Result<String, SpecStoreError> {
        let url = self
            .relative(&format!("{component}/{key}.yaml"))
            .map_err(map_error)?;
        debug!(%url, "fetching spec document");
        self.fetch_yaml(&url).await.map_err(|e| {
            warn!(%url, error = %e, "remote spec document unavailable");
            map_error(e)
        })
    }

    async fn download_url(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, SpecStoreError> {
        let url = Url::parse(url).map_err(|e| map_error(e.into()))?;
        self.download(&url, dest_dir).await.map_err(map_error)
    }

    async fn download_named(
        &self,
        file_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, SpecStoreError> {
        let url = self.relative(file_name).map_err(map_error)?;
        self.download(&url, dest_dir).await.map_err(map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeBackend;
    use tempfile::TempDir;

    const HCA_DOC: &str = "hca:\n  MT_0000000838:\n    hardware:\n      fw_ver: \">=28.39.1002\"\n";

    fn store(backend: FakeBackend) -> HttpSpecStore<FakeBackend> {
        HttpSpecStore::with_backend(backend, Some("https://specs.example.com/hcacheck")).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_document_url_layout() {
        let backend = FakeBackend::new().with_body("/hca/MT_0000000838.yaml", HCA_DOC);
        let store = store(backend);

        let body = store.fetch_document("hca", "MT_0000000838").await.unwrap();
        assert_eq!(body, HCA_DOC);
        assert_eq!(
            store.backend.requests(),
            vec!["https://specs.example.com/hcacheck/hca/MT_0000000838.yaml"]
        );
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let store = store(FakeBackend::new().with_status("/hca/MT_X.yaml", 404));
        assert_eq!(
            store.fetch_document("hca", "MT_X").await,
            Err(SpecStoreError::NotFound {
                url: "https://specs.example.com/hcacheck/hca/MT_X.yaml".to_string(),
                status: 404,
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_rejected() {
        let store = store(FakeBackend::new().with_body("/hca/MT_1.yaml", "hca: [unclosed"));
        assert!(matches!(
            store.fetch_document("hca", "MT_1").await,
            Err(SpecStoreError::InvalidDocument { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_base_url_is_not_configured() {
        let store = HttpSpecStore::with_backend(FakeBackend::new(), None).unwrap();
        assert_eq!(
            store.fetch_document("hca", "MT_1").await,
            Err(SpecStoreError::NotConfigured)
        );
        assert_eq!(
            store.download_named("gpu_spec.yaml", Path::new("/tmp")).await,
            Err(SpecStoreError::NotConfigured)
        );
    }

    #[tokio::test]
    async fn test_download_named_writes_atomically() {
        let dir = TempDir::new().unwrap();
        let store = store(FakeBackend::new().with_body("/gpu_spec.yaml", HCA_DOC));

        let path = store.download_named("gpu_spec.yaml", dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("gpu_spec.yaml"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), HCA_DOC);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_downloads_of_same_file_both_succeed() {
        let dir = TempDir::new().unwrap();
        let store = store(FakeBackend::new().with_body("/gpu_spec.yaml", HCA_DOC));

        let (first, second) = tokio::join!(
            store.download_named("gpu_spec.yaml", dir.path()),
            store.download_named("gpu_spec.yaml", dir.path()),
        );
        assert_eq!(first.unwrap(), dir.path().join("gpu_spec.yaml"));
        assert_eq!(second.unwrap(), dir.path().join("gpu_spec.yaml"));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("gpu_spec.yaml")]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("gpu_spec.yaml")).unwrap(),
            HCA_DOC
        );
    }

    #[tokio::test]
    async fn test_download_url_keeps_file_name() {
        let dir = TempDir::new().unwrap();
        let store = HttpSpecStore::with_backend(
            FakeBackend::new().with_body("/other/site_spec.yaml", HCA_DOC),
            None,
        )
        .unwrap();

        let path = store
            .download_url("https://mirror.example.com/other/site_spec.yaml", dir.path())
            .await
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "site_spec.yaml");
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = store(FakeBackend::new().with_body("/bad_spec.yaml", "a: [b"));
        assert!(store.download_named("bad_spec.yaml", dir.path()).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = parse_base_url("https://specs.example.com/a/b").unwrap();
        assert_eq!(url.join("hca/x.yaml").unwrap().as_str(), "https://specs.example.com/a/b/hca/x.yaml");
        assert!(file_name(&Url::parse("https://specs.example.com/").unwrap()).is_err());
    }
}
