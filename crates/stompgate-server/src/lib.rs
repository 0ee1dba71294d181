//! # stompgate-server
//!
//! STOMP-over-WebSocket endpoint guarded by [`stompgate_auth`].
//!
//! Every connection gets its own [`Session`](stompgate_auth::Session); each
//! inbound frame runs through the shared
//! [`AuthInterceptor`](stompgate_auth::AuthInterceptor) before the in-memory
//! [`Broker`](broker::Broker) sees it.
//!
//! ## Configuration
//!
//! ```bash
//! STOMPGATE_TRUSTED_ISSUER=https://auth.example.com \
//! STOMPGATE_CLIENT_ID=notification-client \
//! STOMPGATE_CLIENT_SECRET=secret \
//! stompgate --bind 0.0.0.0:8080
//! ```

pub mod broker;
pub mod cli;
pub mod connection;
pub mod error;
pub mod server;
pub mod telemetry;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

pub use cli::Cli;
pub use error::{ServerError, ServerResult};
pub use server::{AppState, DEFAULT_WS_PATH, router, serve, shutdown_signal};
pub use telemetry::TelemetryConfig;

/// Parse arguments, initialize logging, and serve until Ctrl-C
///
/// # Errors
///
/// Returns an error if configuration is invalid or the listener fails.
pub async fn run() -> ServerResult<()> {
    let cli = Cli::parse();
    cli.telemetry_config().init()?;

    let config = cli.auth_config()?;
    let state = AppState::from_config(&config)?;
    let listener = TcpListener::bind(cli.bind).await?;

    info!(
        bind = %cli.bind,
        path = %cli.path,
        trusted_issuer = %config.trusted_issuer,
        "STOMP endpoint ready"
    );
    serve(listener, router(state, &cli.path), shutdown_signal()).await
}
