//! Issuer trust policy
//!
//! Splits issuers into two classes:
//!
//! - the **locally trusted** issuer named in [`AuthConfig::trusted_issuer`],
//!   whose tokens are accepted without any remote call;
//! - every other issuer, which is **external** and must confirm the token is
//!   active through its introspection endpoint.
//!
//! External issuers form an open set unless an allowlist is configured: any
//! issuer whose introspection endpoint answers `active: true` is accepted.
//! An inactive answer or a failed introspection rejects the token.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::introspection::{IntrospectionClient, IntrospectionError, Introspector};

/// How an accepted token's issuer was trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerTrust {
    /// Issued by the locally trusted issuer, no remote call made
    Local,
    /// Issued elsewhere and confirmed active by introspection
    Introspected,
}

/// Decides whether a token's issuer is trusted
#[derive(Debug, Clone)]
pub struct IssuerTrustPolicy {
    trusted_issuer: String,
    allowed_external_issuers: Option<Vec<String>>,
    introspector: Arc<dyn Introspector>,
}

impl IssuerTrustPolicy {
    /// Create a policy with an open set of external issuers
    pub fn new(trusted_issuer: impl Into<String>, introspector: Arc<dyn Introspector>) -> Self {
        Self {
            trusted_issuer: trusted_issuer.into(),
            allowed_external_issuers: None,
            introspector,
        }
    }

    /// Build the policy and its HTTP introspection client from configuration
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError`] if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, IntrospectionError> {
        let introspector = Arc::new(IntrospectionClient::from_config(config)?);
        Ok(Self::new(config.trusted_issuer.clone(), introspector)
            .with_allowed_external_issuers(config.allowed_external_issuers.clone()))
    }

    /// Restrict which external issuers may be introspected. `None` lifts the
    /// restriction.
    pub fn with_allowed_external_issuers(mut self, issuers: Option<Vec<String>>) -> Self {
        self.allowed_external_issuers = issuers;
        self
    }

    /// Accept or reject a token based on its issuer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UntrustedOrInactiveToken`] when an external issuer
    /// is not allowlisted, reports the token inactive, or cannot be reached.
    pub async fn authorize(&self, issuer_uri: &str, token: &str) -> AuthResult<IssuerTrust> {
        if issuer_uri == self.trusted_issuer {
            debug!(issuer = issuer_uri, "Token issued by trusted issuer");
            return Ok(IssuerTrust::Local);
        }

        if let Some(allowed) = &self.allowed_external_issuers
            && !allowed.iter().any(|a| a == issuer_uri)
        {
            warn!(issuer = issuer_uri, "External issuer is not allowlisted");
            return Err(AuthError::UntrustedOrInactiveToken(format!(
                "issuer {} is not allowlisted",
                issuer_uri
            )));
        }

        match self.introspector.is_token_active(token, issuer_uri).await {
            Ok(true) => {
                debug!(issuer = issuer_uri, "External token confirmed active");
                Ok(IssuerTrust::Introspected)
            }
            Ok(false) => {
                warn!(issuer = issuer_uri, "External token reported inactive");
                Err(AuthError::UntrustedOrInactiveToken(format!(
                    "issuer {} reports token inactive",
                    issuer_uri
                )))
            }
            Err(e) => {
                warn!(issuer = issuer_uri, error = %e, "Introspection failed, rejecting token");
                Err(AuthError::UntrustedOrInactiveToken(e.to_string()))
            }
        }
    }
}
