//! Connection settings for the hosted backend.

use std::time::Duration;

use agora_core::types::ServiceUrl;

/// Connection settings for a hosted project.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL.
    pub url: ServiceUrl,
    /// Public (anon) API key sent with every request.
    pub api_key: String,
    /// User access token; the API key is used as bearer when absent.
    pub access_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl RestConfig {
    /// Settings with no user session and no timeout.
    pub fn new(url: ServiceUrl, api_key: impl Into<String>) -> Self {
        Self {
            url,
            api_key: api_key.into(),
            access_token: None,
            timeout: None,
        }
    }

    /// Authenticate requests as a signed-in user.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Bound every request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The bearer token for the `Authorization` header.
    pub(crate) fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }
}
