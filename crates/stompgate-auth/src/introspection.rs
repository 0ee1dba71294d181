//! OAuth 2.0 Token Introspection (RFC 7662)
//!
//! Asks a token's issuer whether the token is still active. The request is a
//! form-encoded POST to `<issuer><path>` (path defaults to
//! `/oauth2/introspect`) authenticated with the interceptor's client
//! credentials as HTTP Basic, carrying a single `token` parameter.
//!
//! # Failing closed
//!
//! Only a 2xx response whose JSON body has a boolean `active` field is ever
//! read as an answer. Transport errors, timeouts, non-2xx statuses, and bodies
//! without a boolean `active` are all errors, and callers must treat an error
//! exactly like `active: false`.
//!
//! # Example
//!
//! ```rust,no_run
//! use stompgate_auth::introspection::{IntrospectionClient, Introspector};
//! use stompgate_auth::IntrospectionConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = IntrospectionClient::new(
//!     "notification-client",
//!     "client-secret",
//!     IntrospectionConfig::default(),
//! )?;
//!
//! if client.is_token_active("eyJ...", "https://auth.example.com").await? {
//!     println!("Token is valid");
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AuthConfig, IntrospectionConfig};
use crate::credentials::basic_authorization;

/// Errors raised while introspecting a token
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntrospectionError {
    /// Issuer URI does not produce a usable endpoint URL
    #[error("invalid introspection endpoint {0}")]
    InvalidEndpoint(String),

    /// Request could not be sent or timed out
    #[error("introspection request failed: {0}")]
    Transport(String),

    /// Endpoint answered with a non-2xx status
    #[error("introspection endpoint returned status {0}")]
    Status(u16),

    /// Body is not JSON with a boolean `active` field
    #[error("invalid introspection response: {0}")]
    InvalidResponse(String),
}

/// Token introspection response per RFC 7662 Section 2.2.
///
/// Only `active` is consulted; the remaining members are kept for logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active (REQUIRED)
    pub active: bool,

    /// Additional fields
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

/// Anything that can answer "is this token active?" for an issuer
#[async_trait]
pub trait Introspector: Send + Sync + fmt::Debug {
    /// Ask `issuer_uri` whether `token` is active.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError`] when no trustworthy answer was obtained.
    async fn is_token_active(
        &self,
        token: &str,
        issuer_uri: &str,
    ) -> Result<bool, IntrospectionError>;
}

/// Short-lived memory of tokens an issuer reported active.
///
/// Keys are SHA-256 digests so raw tokens are never retained. Negative answers
/// and errors are never cached.
#[derive(Debug)]
struct ActiveTokenCache {
    ttl: std::time::Duration,
    entries: DashMap<[u8; 32], Instant>,
}

impl ActiveTokenCache {
    fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn key(token: &str) -> [u8; 32] {
        Sha256::digest(token.as_bytes()).into()
    }

    fn contains(&self, token: &str) -> bool {
        let key = Self::key(token);
        if let Some(entry) = self.entries.get(&key) {
            if Instant::now() < *entry {
                return true;
            }
            // Entry expired, remove it
            drop(entry);
            self.entries.remove(&key);
        }
        false
    }

    /// Remember `token` as active and drop every expired entry
    fn insert(&self, token: &str) {
        let now = Instant::now();
        self.entries.retain(|_, expires_at| *expires_at > now);

        // A TTL past the clock's range cannot be represented; skip caching
        let Some(expires_at) = now.checked_add(self.ttl) else {
            debug!(ttl_secs = self.ttl.as_secs(), "Cache TTL out of range, not caching");
            return;
        };
        self.entries.insert(Self::key(token), expires_at);
    }
}

/// HTTP introspection client
#[derive(Clone)]
pub struct IntrospectionClient {
    /// Client ID for authentication
    client_id: String,

    /// Client secret for authentication
    client_secret: SecretString,

    /// Endpoint path, retry and cache settings
    config: IntrospectionConfig,

    /// HTTP client
    http_client: reqwest::Client,

    /// Positive answers, when enabled
    cache: Option<std::sync::Arc<ActiveTokenCache>>,
}

// Manual Debug impl to prevent client_secret exposure in logs
impl fmt::Debug for IntrospectionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("config", &self.config)
            .field("http_client", &"<reqwest::Client>")
            .field("cache", &self.cache.as_ref().map(|c| c.entries.len()))
            .finish()
    }
}

impl IntrospectionClient {
    /// Create a new introspection client.
    ///
    /// Redirects are never followed and every request is bounded by
    /// `config.timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        config: IntrospectionConfig,
    ) -> Result<Self, IntrospectionError> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                IntrospectionError::Transport(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self::with_http_client(
            client_id,
            client_secret,
            config,
            http_client,
        ))
    }

    /// Create a client around an existing `reqwest::Client`.
    ///
    /// Ensure the client does not follow redirects.
    pub fn with_http_client(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        config: IntrospectionConfig,
        http_client: reqwest::Client,
    ) -> Self {
        let cache = config
            .cache_ttl
            .map(|ttl| std::sync::Arc::new(ActiveTokenCache::new(ttl)));
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            config,
            http_client,
            cache,
        }
    }

    /// Create a client from the interceptor configuration
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, IntrospectionError> {
        Self::new(
            config.client_id.clone(),
            config.client_secret().to_string(),
            config.introspection.clone(),
        )
    }

    /// Introspection endpoint for an issuer
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::InvalidEndpoint`] when the result is not an
    /// absolute http(s) URL.
    pub fn endpoint_for(&self, issuer_uri: &str) -> Result<reqwest::Url, IntrospectionError> {
        let raw = format!("{}{}", issuer_uri.trim_end_matches('/'), self.config.path);
        let url = reqwest::Url::parse(&raw)
            .map_err(|e| IntrospectionError::InvalidEndpoint(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(IntrospectionError::InvalidEndpoint(format!(
                "{}: unsupported scheme {}",
                raw, other
            ))),
        }
    }

    /// Introspect a token per RFC 7662, retrying transport errors and 5xx
    /// responses up to `config.retries` times.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the endpoint URL is invalid
    /// - every attempt fails in transport or with a 5xx status
    /// - the endpoint answers with a non-2xx status
    /// - the response body has no boolean `active`
    pub async fn introspect(
        &self,
        token: &str,
        issuer_uri: &str,
    ) -> Result<IntrospectionResponse, IntrospectionError> {
        let endpoint = self.endpoint_for(issuer_uri)?;
        let authorization =
            basic_authorization(&self.client_id, self.client_secret.expose_secret());

        let mut attempt = 0u32;
        loop {
            let result = self
                .http_client
                .post(endpoint.clone())
                .header(AUTHORIZATION, authorization.as_str())
                .form(&[("token", token)])
                .send()
                .await;

            let retryable = match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<IntrospectionResponse>()
                        .await
                        .map_err(|e| IntrospectionError::InvalidResponse(e.to_string()));
                }
                Ok(response) if response.status().is_server_error() => {
                    IntrospectionError::Status(response.status().as_u16())
                }
                Ok(response) => {
                    return Err(IntrospectionError::Status(response.status().as_u16()));
                }
                Err(e) => IntrospectionError::Transport(e.to_string()),
            };

            if attempt >= self.config.retries {
                return Err(retryable);
            }

            let delay = self
                .config
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt));
            attempt += 1;
            warn!(
                endpoint = %endpoint,
                attempt,
                error = %retryable,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Introspection attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Introspector for IntrospectionClient {
    async fn is_token_active(
        &self,
        token: &str,
        issuer_uri: &str,
    ) -> Result<bool, IntrospectionError> {
        if let Some(cache) = &self.cache
            && cache.contains(token)
        {
            debug!(issuer = issuer_uri, "Introspection answered from cache");
            return Ok(true);
        }

        let response = self.introspect(token, issuer_uri).await?;
        debug!(
            issuer = issuer_uri,
            active = response.active,
            "Introspection completed"
        );

        if response.active
            && let Some(cache) = &self.cache
        {
            cache.insert(token);
        }
        Ok(response.active)
    }
}
