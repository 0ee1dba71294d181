//! Authentication configuration types
//!
//! The values here are supplied by whoever hosts the interceptor; this crate
//! never loads them itself.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::destination::DEFAULT_TOPIC_PREFIX;

/// Default path appended to an issuer URI to reach its introspection endpoint
pub const DEFAULT_INTROSPECTION_PATH: &str = "/oauth2/introspect";

/// Interceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Issuer URI whose tokens are accepted without introspection
    pub trusted_issuer: String,
    /// Client ID presented to introspection endpoints
    pub client_id: String,
    /// Client secret presented to introspection endpoints
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub client_secret: SecretString,
    /// External issuers allowed to reach introspection.
    ///
    /// `None` accepts any issuer whose introspection endpoint reports the
    /// token active.
    #[serde(default)]
    pub allowed_external_issuers: Option<Vec<String>>,
    /// Prefix of destinations whose client segment is authorized on SUBSCRIBE
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Introspection client settings
    #[serde(default)]
    pub introspection: IntrospectionConfig,
}

impl AuthConfig {
    /// Create a configuration with default introspection settings
    pub fn new(
        trusted_issuer: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            trusted_issuer: trusted_issuer.into(),
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            allowed_external_issuers: None,
            topic_prefix: default_topic_prefix(),
            introspection: IntrospectionConfig::default(),
        }
    }

    /// Restrict external issuers to an explicit allowlist
    pub fn with_allowed_external_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_external_issuers = Some(issuers.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the introspection settings
    pub fn with_introspection(mut self, introspection: IntrospectionConfig) -> Self {
        self.introspection = introspection;
        self
    }

    /// Borrow the client secret
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

/// Introspection client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionConfig {
    /// Path appended to the issuer URI
    #[serde(default = "default_path")]
    pub path: String,
    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Extra attempts after a transport error or 5xx response
    #[serde(default)]
    pub retries: u32,
    /// Delay before the first retry, doubled for each further one
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: Duration,
    /// How long an `active: true` answer is reused. `None` disables caching.
    #[serde(default)]
    pub cache_ttl: Option<Duration>,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            timeout: default_timeout(),
            retries: 0,
            retry_backoff: default_retry_backoff(),
            cache_ttl: None,
        }
    }
}

impl IntrospectionConfig {
    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable bounded retries
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.retry_backoff = backoff;
        self
    }

    /// Enable the positive-result cache
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_path() -> String {
    DEFAULT_INTROSPECTION_PATH.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(100)
}

// Custom serialization for SecretString
fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

// Custom deserialization for SecretString
fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(SecretString::new(s))
}
