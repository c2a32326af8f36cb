//! Client configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported base URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Where the remote API lives.
///
/// The base URL is always `http` or `https`; duplex channels use the
/// matching `ws` / `wss` scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientConfig {
    base_url: String,
}

impl ClientConfig {
    /// Create a config from a base URL such as `https://komodo.example.com`.
    ///
    /// The URL is stored in its parsed form: scheme and host lowercased,
    /// surrounding whitespace removed, no trailing slash.
    ///
    /// # Errors
    /// Returns error if the URL does not parse or is not `http(s)`.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// The normalized base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The websocket base: `http` becomes `ws`, `https` becomes `wss`.
    #[must_use]
    pub fn ws_base_url(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        }
    }

    /// Full URL for a one-shot request path such as `/terminal/execute`.
    ///
    /// # Errors
    /// Returns error if the joined URL does not parse.
    pub fn http_url(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}{path}", self.base_url))
    }

    /// Full websocket URL for `path`, with `query` form-encoded.
    ///
    /// # Errors
    /// Returns error if the joined URL does not parse.
    pub fn ws_url(&self, path: &str, query: &[(String, String)]) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}{path}", self.ws_base_url()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

impl TryFrom<String> for ClientConfig {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ClientConfig> for String {
    fn from(config: ClientConfig) -> Self {
        config.base_url
    }
}
