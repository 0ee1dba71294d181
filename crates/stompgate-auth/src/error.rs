//! Authentication error types
//!
//! Every check performed by the interceptor reports a distinct [`AuthError`] kind
//! so that logs can say which check failed. None of that detail ever reaches the
//! remote client: at the interceptor boundary each kind is collapsed into the
//! single [`Forbidden`] failure.

use thiserror::Error;

use crate::frame::{Frame, StompCommand};

/// The one failure message a remote client is ever shown.
pub const FORBIDDEN: &str = "Forbidden";

/// Internal reason a frame was refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No `token` header on CONNECT, or no stored token on SUBSCRIBE
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    /// The token cannot be structurally parsed
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// External token reported inactive, or introspection itself failed
    #[error("untrusted or inactive token: {0}")]
    UntrustedOrInactiveToken(String),

    /// SUBSCRIBE without a `destination` header
    #[error("missing destination header")]
    MissingDestination,

    /// Destination does not have the `<prefix><client>/...` shape
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// Token audience differs from the destination's client segment
    #[error("audience mismatch: token audience {audience:?} does not match client {client:?}")]
    AudienceMismatch {
        /// Audience claim after list decoration was stripped
        audience: String,
        /// Client segment parsed from the destination
        client: String,
    },

    /// The session was already rejected by an earlier frame
    #[error("session already rejected")]
    Rejected,
}

impl AuthError {
    /// Short stable label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "missing_credential",
            Self::MalformedToken(_) => "malformed_token",
            Self::UntrustedOrInactiveToken(_) => "untrusted_or_inactive_token",
            Self::MissingDestination => "missing_destination",
            Self::InvalidDestination(_) => "invalid_destination",
            Self::AudienceMismatch { .. } => "audience_mismatch",
            Self::Rejected => "rejected",
        }
    }
}

/// Result type for internal authentication steps
pub type AuthResult<T> = Result<T, AuthError>;

/// The externally visible refusal of a frame.
///
/// Carries no detail on purpose. Converting from an [`AuthError`] discards the
/// kind, so the transport cannot leak which check failed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Default)]
#[error("Forbidden")]
pub struct Forbidden;

impl From<AuthError> for Forbidden {
    fn from(_: AuthError) -> Self {
        Forbidden
    }
}

impl Forbidden {
    /// Build the STOMP `ERROR` frame a transport sends before closing.
    pub fn into_error_frame(self) -> Frame {
        Frame::new(StompCommand::Error).with_header("message", FORBIDDEN)
    }
}
