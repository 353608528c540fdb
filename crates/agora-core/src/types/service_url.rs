//! Backend service URL type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, InvalidInputError};

/// A validated backend URL.
///
/// Either a hosted project URL (HTTPS, or HTTP for localhost) or a
/// `file://` directory used by the local file backend.
///
/// # Example
///
/// ```
/// use agora_core::ServiceUrl;
///
/// let url = ServiceUrl::new("https://project.example.co").unwrap();
/// assert_eq!(url.rest_url("posts"), "https://project.example.co/rest/v1/posts");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceUrl(Url);

impl ServiceUrl {
    /// Create a new service URL from a string, validating the format.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = Url::parse(s).map_err(|e| InvalidInputError::ServiceUrl {
            value: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&url, s)?;

        Ok(Self(url))
    }

    /// Whether this URL points at a local file backend.
    pub fn is_local(&self) -> bool {
        self.0.scheme() == "file"
    }

    /// Convert a `file://` URL to a directory path.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.is_local() {
            self.0.to_file_path().ok()
        } else {
            None
        }
    }

    /// Returns the REST endpoint for a collection.
    pub fn rest_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.base(), collection)
    }

    /// Returns the realtime websocket endpoint.
    pub fn realtime_url(&self, api_key: &str) -> String {
        let ws_base = self
            .base()
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, api_key
        )
    }

    /// Returns the URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the inner URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    fn base(&self) -> &str {
        // The url crate always keeps a trailing slash on root paths.
        self.0.as_str().trim_end_matches('/')
    }

    fn validate(url: &Url, original: &str) -> Result<(), Error> {
        let invalid = |reason: &str| -> Error {
            InvalidInputError::ServiceUrl {
                value: original.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };

        let scheme = url.scheme();
        if scheme == "file" {
            return Ok(());
        }

        if url.cannot_be_a_base() {
            return Err(invalid("must be an absolute URL"));
        }

        let Some(host) = url.host_str() else {
            return Err(invalid("must have a host"));
        };

        let is_localhost = host == "localhost" || host == "127.0.0.1" || host == "[::1]";
        if scheme != "https" && !(scheme == "http" && is_localhost) {
            return Err(invalid("must use HTTPS (HTTP allowed only for localhost)"));
        }

        Ok(())
    }
}

impl fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServiceUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ServiceUrl {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ServiceUrl> for String {
    fn from(url: ServiceUrl) -> Self {
        url.0.to_string()
    }
}
