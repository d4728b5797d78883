//! HTTP backend abstraction for the spec store.
//!
//! The production implementation uses reqwest with retry for transient
//! errors; tests use [`testing::FakeBackend`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};

// ============================================================================
// HTTP Backend Trait
// ============================================================================

/// Fetches response bodies as text.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// GET `url` and return the body of a successful response.
    async fn get_text(&self, url: &Url) -> RemoteResult<String>;
}

// ============================================================================
// Reqwest Backend
// ============================================================================

/// Production HTTP backend using reqwest with retry logic.
///
/// Server errors (5xx) and network errors are retried with exponential
/// backoff; other statuses fail immediately.
pub struct ReqwestBackend {
    client: reqwest::Client,
    max_retries: u8,
    retry_base_delay: Duration,
}

impl ReqwestBackend {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    async fn fetch_once(&self, url: &Url) -> RemoteResult<String> {
        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn get_text(&self, url: &Url) -> RemoteResult<String> {
        let mut attempt: u8 = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(%url, bytes = body.len(), attempt, "fetched");
                    return Ok(body);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(u32::from(attempt)));
                    warn!(
                        %url,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// Fake Backend for Testing
// ============================================================================
