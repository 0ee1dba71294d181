//! Server error types

use stompgate_auth::IntrospectionError;
use thiserror::Error;

/// Errors that stop the server from starting or serving
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving the listener failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The introspection client could not be built
    #[error("Failed to build interceptor: {0}")]
    Interceptor(#[from] IntrospectionError),

    /// Tracing subscriber could not be installed
    #[error("Failed to initialize telemetry: {0}")]
    Telemetry(String),

    /// Invalid command-line or environment configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
