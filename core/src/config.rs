//! Connection settings for a Jenkins server.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ApiError;

pub const ENV_URL: &str = "JENKINS_URL";
pub const ENV_USER: &str = "JENKINS_USER";
pub const ENV_API_TOKEN: &str = "JENKINS_API_TOKEN";

/// Base URL plus the username/API-token pair used for basic auth.
///
/// Immutable once built. The token never appears in `Debug` output.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    username: String,
    api_token: String,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            api_token: api_token.into(),
        }
    }

    /// Read `JENKINS_URL`, `JENKINS_USER` and `JENKINS_API_TOKEN`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let var = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Config(format!("{key} is not set")))
        };
        Ok(Self::new(var(ENV_URL)?, var(ENV_USER)?, var(ENV_API_TOKEN)?))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.api_token);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .finish()
    }
}
