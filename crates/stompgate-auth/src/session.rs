//! Per-connection session state
//!
//! A [`Session`] is created when a connection opens and dropped when it
//! closes. It is owned by that connection alone: the interceptor receives it
//! as `&mut Session` on every frame and never keeps a copy, so two connections
//! can never observe each other's token.

use std::fmt;

use uuid::Uuid;

use crate::identity::Identity;

/// Identifier of one connection's session, used in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a random session identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Holds the token presented on this connection's CONNECT
#[derive(Default)]
pub struct SessionTokenContext {
    token: Option<String>,
}

// Manual Debug impl to prevent token exposure in logs
impl fmt::Debug for SessionTokenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenContext")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SessionTokenContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the token, replacing any earlier one
    pub fn set(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// The stored token, if CONNECT has supplied one
    pub fn get(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Forget the stored token
    pub fn clear(&mut self) {
        self.token = None;
    }
}

/// Authentication state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No successful CONNECT yet
    #[default]
    Unauthenticated,
    /// CONNECT succeeded and an identity is bound
    Authenticated,
    /// A frame failed validation; every later frame is refused
    Rejected,
}

/// State owned by one connection
#[derive(Debug, Default)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    tokens: SessionTokenContext,
    principal: Option<Identity>,
}

impl Session {
    /// Create the session for a newly opened connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identity bound by CONNECT
    pub fn principal(&self) -> Option<&Identity> {
        self.principal.as_ref()
    }

    /// Token context of this connection
    pub fn tokens(&self) -> &SessionTokenContext {
        &self.tokens
    }

    /// Mutable token context of this connection
    pub fn tokens_mut(&mut self) -> &mut SessionTokenContext {
        &mut self.tokens
    }

    pub(crate) fn authenticate(&mut self, identity: Identity) {
        self.principal = Some(identity);
        self.state = SessionState::Authenticated;
    }

    pub(crate) fn reject(&mut self) {
        self.state = SessionState::Rejected;
    }
}
