//! Tracing subscriber initialization

use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::error::{ServerError, ServerResult};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset (e.g. "info,stompgate_auth=debug")
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Install the global subscriber.
    ///
    /// `RUST_LOG` takes precedence over [`log_level`](Self::log_level).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Telemetry`] if the filter is invalid or a global
    /// subscriber is already installed.
    pub fn init(&self) -> ServerResult<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .map_err(|e| ServerError::Telemetry(format!("Invalid log level: {e}")))?;

        if self.json_logs {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json();

            Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| ServerError::Telemetry(e.to_string()))
        } else {
            let fmt_layer = fmt::layer().with_target(true).with_thread_ids(false);

            Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| ServerError::Telemetry(e.to_string()))
        }
    }
}
