//! Command-line and environment configuration

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use stompgate_auth::{AuthConfig, IntrospectionConfig};

use crate::error::{ServerError, ServerResult};
use crate::telemetry::TelemetryConfig;

/// Longest accepted introspection cache TTL, in seconds (one day)
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;

/// STOMP-over-WebSocket endpoint with bearer-token authentication
#[derive(Parser, Debug, Clone)]
#[command(name = "stompgate", version, about)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "STOMPGATE_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// WebSocket endpoint path
    #[arg(long, env = "STOMPGATE_PATH", default_value = crate::server::DEFAULT_WS_PATH)]
    pub path: String,

    /// Issuer whose tokens are accepted without introspection
    #[arg(long, env = "STOMPGATE_TRUSTED_ISSUER")]
    pub trusted_issuer: String,

    /// Client ID presented to introspection endpoints
    #[arg(long, env = "STOMPGATE_CLIENT_ID")]
    pub client_id: String,

    /// Client secret presented to introspection endpoints
    #[arg(long, env = "STOMPGATE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Comma-separated external issuers to accept (default: any)
    #[arg(long, env = "STOMPGATE_ALLOWED_ISSUERS", value_delimiter = ',')]
    pub allowed_issuers: Vec<String>,

    /// Introspection request timeout in seconds
    #[arg(long, env = "STOMPGATE_INTROSPECTION_TIMEOUT", default_value_t = 10)]
    pub introspection_timeout: u64,

    /// Extra introspection attempts after a transport error or 5xx
    #[arg(long, env = "STOMPGATE_INTROSPECTION_RETRIES", default_value_t = 0)]
    pub introspection_retries: u32,

    /// Seconds to remember an active introspection result (0 disables)
    #[arg(long, env = "STOMPGATE_INTROSPECTION_CACHE_TTL", default_value_t = 0)]
    pub introspection_cache_ttl: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "STOMPGATE_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "STOMPGATE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    /// Interceptor configuration
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfiguration`] when a required value is empty
    /// or the cache TTL exceeds [`MAX_CACHE_TTL_SECS`].
    pub fn auth_config(&self) -> ServerResult<AuthConfig> {
        if self.trusted_issuer.trim().is_empty() {
            return Err(ServerError::InvalidConfiguration(
                "trusted issuer must not be empty".to_string(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(ServerError::InvalidConfiguration(
                "client id must not be empty".to_string(),
            ));
        }
        if self.introspection_cache_ttl > MAX_CACHE_TTL_SECS {
            return Err(ServerError::InvalidConfiguration(format!(
                "introspection cache TTL must be at most {} seconds",
                MAX_CACHE_TTL_SECS
            )));
        }

        let mut introspection = IntrospectionConfig::default()
            .with_timeout(Duration::from_secs(self.introspection_timeout))
            .with_retries(
                self.introspection_retries,
                IntrospectionConfig::default().retry_backoff,
            );
        if self.introspection_cache_ttl > 0 {
            introspection =
                introspection.with_cache_ttl(Duration::from_secs(self.introspection_cache_ttl));
        }

        let mut config = AuthConfig::new(
            self.trusted_issuer.as_str(),
            self.client_id.as_str(),
            self.client_secret.as_str(),
        )
        .with_introspection(introspection);
        if !self.allowed_issuers.is_empty() {
            config = config.with_allowed_external_issuers(self.allowed_issuers.iter().cloned());
        }
        Ok(config)
    }

    /// Logging configuration
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
        }
    }
}
