//! Internal error types for remote store operations.
//!
//! These errors are internal to `hcacheck-remote` and are mapped to the core
//! `SpecStoreError` at the port boundary.

use std::path::PathBuf;

use thiserror::Error;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server answered with a non-success status.
    #[error("Request for {url} failed with status {status}")]
    Status { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A URL that does not end in a file name.
    #[error("URL '{0}' has no file name")]
    NoFileName(String),

    #[error("No base URL configured")]
    NoBaseUrl,

    #[error("Body of {url} is not valid YAML: {source}")]
    InvalidYaml {
        url: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteError {
    /// Server-side failures and network errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Network(_) => true,
            _ => false,
        }
    }
}
