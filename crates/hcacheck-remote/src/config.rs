//! Public configuration for the remote spec store.

use std::time::Duration;

use hcacheck_core::Settings;

/// Configuration for [`crate::HttpSpecStore`].
///
/// # Example
///
/// ```
/// use hcacheck_remote::RemoteConfig;
/// use std::time::Duration;
///
/// let config = RemoteConfig::new()
///     .with_base_url("https://specs.example.com/hcacheck")
///     .with_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the store; relative lookups fail without one.
    pub(crate) base_url: Option<String>,
    pub(crate) user_agent: String,
    pub(crate) timeout: Duration,
    /// Retries after the first attempt for 5xx and network errors.
    pub(crate) max_retries: u8,
    pub(crate) retry_base_delay: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: concat!("hcacheck/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl RemoteConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL and HTTP timeout from agent settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new()
            .with_optional_base_url(settings.spec_url.clone())
            .with_timeout(settings.effective_http_timeout())
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_optional_base_url(mut self, url: Option<String>) -> Self {
        self.base_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-request timeout.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Defaults to 3 retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay for exponential backoff retries.
    ///
    /// Defaults to 500ms.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}
