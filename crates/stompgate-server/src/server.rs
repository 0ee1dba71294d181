//! WebSocket endpoint and listener

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use stompgate_auth::{AuthConfig, AuthInterceptor};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::connection::handle_socket;
use crate::error::ServerResult;

/// Path of the STOMP endpoint
pub const DEFAULT_WS_PATH: &str = "/chat-app";

/// STOMP subprotocols offered during the upgrade
const STOMP_SUBPROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];

/// State shared by every connection
#[derive(Debug, Clone)]
pub struct AppState {
    /// Interceptor shared by all connections; sessions stay per connection
    pub interceptor: Arc<AuthInterceptor>,
    /// Topic registry
    pub broker: Arc<Broker>,
    /// Destinations accepted on SEND
    pub topic_prefix: String,
}

impl AppState {
    /// Build the interceptor and an empty broker
    ///
    /// # Errors
    ///
    /// Returns an error if the introspection client cannot be built.
    pub fn from_config(config: &AuthConfig) -> ServerResult<Self> {
        Ok(Self {
            interceptor: Arc::new(AuthInterceptor::from_config(config)?),
            broker: Arc::new(Broker::new()),
            topic_prefix: config.topic_prefix.clone(),
        })
    }
}

/// Router exposing the STOMP endpoint at `path`
pub fn router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, get(websocket_handler))
        .with_state(state)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!(peer = %peer, "WebSocket upgrade");
    ws.protocols(STOMP_SUBPROTOCOLS)
        .on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Serve `app` on `listener` until `shutdown` resolves
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
