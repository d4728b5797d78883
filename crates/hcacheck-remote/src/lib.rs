#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod config;
mod error;
mod http;
mod store;

// ============================================================================
// Public API
// ============================================================================

// Store
pub use store::{DefaultSpecStore, HttpSpecStore};

// HTTP backends
pub use http::{HttpBackend, ReqwestBackend};

// Configuration
pub use config::RemoteConfig;

// Errors
pub use error::{RemoteError, RemoteResult};

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
#[cfg(test)]
use wiremock as _;
