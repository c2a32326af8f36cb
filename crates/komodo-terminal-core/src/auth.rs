//! Caller-held credentials and the login frame built from them.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

/// Header carrying a JWT on one-shot requests.
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Header carrying the API key on one-shot requests.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the API secret on one-shot requests.
pub const API_SECRET_HEADER: &str = "x-api-secret";

/// Auth state held by the caller.
///
/// Any combination of fields may be set. A non-empty JWT always wins over
/// the API key pair; see [`AuthState::credentials`].
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl AuthState {
    /// State holding only a JWT.
    #[must_use]
    pub fn jwt(token: impl Into<String>) -> Self {
        Self {
            jwt: Some(token.into()),
            ..Self::default()
        }
    }

    /// State holding only an API key pair.
    #[must_use]
    pub fn api_keys(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            jwt: None,
            key: Some(key.into()),
            secret: Some(secret.into()),
        }
    }

    /// Select the credentials to use for one connection attempt.
    ///
    /// Returns `None` when neither a JWT nor a complete key pair is present.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        if let Some(token) = non_empty(self.jwt.as_deref()) {
            return Some(Credentials::Jwt {
                token: token.to_string(),
            });
        }
        match (non_empty(self.key.as_deref()), non_empty(self.secret.as_deref())) {
            (Some(key), Some(secret)) => Some(Credentials::ApiKeyPair {
                key: key.to_string(),
                secret: secret.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("jwt", &self.jwt.as_ref().map(|_| "<redacted>"))
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Credentials used for exactly one connect or execute call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Bearer-style JWT.
    Jwt { token: String },
    /// API key and secret.
    ApiKeyPair { key: String, secret: String },
}

impl Credentials {
    /// Build the first frame sent on a duplex channel.
    #[must_use]
    pub fn login_message(&self) -> LoginMessage {
        match self {
            Self::Jwt { token } => LoginMessage::Jwt { jwt: token.clone() },
            Self::ApiKeyPair { key, secret } => LoginMessage::ApiKeys {
                key: key.clone(),
                secret: secret.clone(),
            },
        }
    }

    /// Header name/value pairs for a one-shot request.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Jwt { token } => vec![(AUTHORIZATION_HEADER, token.clone())],
            Self::ApiKeyPair { key, secret } => vec![
                (API_KEY_HEADER, key.clone()),
                (API_SECRET_HEADER, secret.clone()),
            ],
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt { .. } => f.write_str("Credentials::Jwt"),
            Self::ApiKeyPair { key, .. } => write!(f, "Credentials::ApiKeyPair({key})"),
        }
    }
}

/// Login frame, sent first on every duplex channel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum LoginMessage {
    /// `{"type":"Jwt","params":{"jwt":..}}`
    Jwt { jwt: String },
    /// `{"type":"ApiKeys","params":{"key":..,"secret":..}}`
    ApiKeys { key: String, secret: String },
}

impl LoginMessage {
    /// Serialize to the JSON text frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Debug for LoginMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt { .. } => f.write_str("LoginMessage::Jwt"),
            Self::ApiKeys { key, .. } => write!(f, "LoginMessage::ApiKeys({key})"),
        }
    }
}

/// Source of credentials, read at the moment of each call.
pub trait CredentialSource: Send + Sync {
    /// Current credentials, if any.
    fn credentials(&self) -> Option<Credentials>;
}

impl CredentialSource for AuthState {
    fn credentials(&self) -> Option<Credentials> {
        Self::credentials(self)
    }
}

impl CredentialSource for RwLock<AuthState> {
    fn credentials(&self) -> Option<Credentials> {
        match self.read() {
            Ok(state) => state.credentials(),
            Err(poisoned) => poisoned.into_inner().credentials(),
        }
    }
}

impl<T: CredentialSource + ?Sized> CredentialSource for Arc<T> {
    fn credentials(&self) -> Option<Credentials> {
        (**self).credentials()
    }
}
