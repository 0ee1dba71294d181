//! Frame-level authentication and authorization
//!
//! ```text
//!                 CONNECT ok           SUBSCRIBE ok
//! Unauthenticated ──────► Authenticated ◄──────────┐
//!        │                     │  └────────────────┘
//!        │ any failure         │ any failure
//!        └──────► Rejected ◄───┘
//! ```
//!
//! - **CONNECT** (or its `STOMP` alias): read the `token` header, store it in the
//!   session, decode its claims, run the [`IssuerTrustPolicy`], and bind an
//!   [`Identity`] built from `email`, `name` and `surname`.
//! - **SUBSCRIBE**: read the session's token, parse the client segment of the
//!   `destination`, and require it to equal the token's `aud` claim once list
//!   brackets are stripped.
//! - Every other command passes through untouched.
//!
//! Every failure is logged with its [`AuthError`] kind and surfaces to the
//! transport as the single [`Forbidden`] value. `Rejected` is terminal: later
//! frames on that session are refused without further checks, and the
//! transport is expected to close the connection.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::claims::{ClaimSet, strip_list_decoration};
use crate::config::AuthConfig;
use crate::destination::{DEFAULT_TOPIC_PREFIX, client_segment};
use crate::error::{AuthError, AuthResult, Forbidden};
use crate::frame::{Frame, StompCommand};
use crate::identity::Identity;
use crate::introspection::IntrospectionError;
use crate::policy::IssuerTrustPolicy;
use crate::session::{Session, SessionState};

/// Header carrying the bearer token on CONNECT
pub const TOKEN_HEADER: &str = "token";
/// Header carrying the subscription target on SUBSCRIBE
pub const DESTINATION_HEADER: &str = "destination";

/// Checks applied to the two commands that need authorization
#[async_trait]
pub trait FrameInterceptor: Send + Sync {
    /// Authenticate a CONNECT frame and bind its identity to `session`
    async fn on_connect(&self, frame: &Frame, session: &mut Session) -> AuthResult<()>;

    /// Authorize a SUBSCRIBE frame against the identity bound to `session`
    async fn on_subscribe(&self, frame: &Frame, session: &Session) -> AuthResult<()>;
}

/// Run `interceptor` on one inbound frame of `session`.
///
/// Returns the frame unchanged when it may be forwarded.
///
/// # Errors
///
/// Returns [`Forbidden`] when the frame must not be forwarded. The session is
/// then in [`SessionState::Rejected`] and holds no token.
#[tracing::instrument(
    skip_all,
    fields(session = %session.id(), command = %frame.command())
)]
pub async fn intercept<I>(
    interceptor: &I,
    frame: Frame,
    session: &mut Session,
) -> Result<Frame, Forbidden>
where
    I: FrameInterceptor + ?Sized,
{
    if session.state() == SessionState::Rejected {
        warn!(kind = AuthError::Rejected.kind(), "Frame on rejected session");
        return Err(AuthError::Rejected.into());
    }

    let outcome = match frame.command() {
        command if command.is_connect() => interceptor.on_connect(&frame, session).await,
        StompCommand::Subscribe => interceptor.on_subscribe(&frame, session).await,
        _ => return Ok(frame),
    };

    match outcome {
        Ok(()) => Ok(frame),
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Frame rejected");
            session.tokens_mut().clear();
            session.reject();
            Err(e.into())
        }
    }
}

/// Bearer-token interceptor for STOMP sessions.
///
/// Stateless with respect to connections; share one instance across all of
/// them and pass each connection's own [`Session`].
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    policy: IssuerTrustPolicy,
    topic_prefix: String,
}

impl AuthInterceptor {
    /// Create an interceptor for `/topic/` destinations
    pub fn new(policy: IssuerTrustPolicy) -> Self {
        Self {
            policy,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
        }
    }

    /// Build the interceptor, its policy and its introspection client
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError`] if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, IntrospectionError> {
        Ok(Self::new(IssuerTrustPolicy::from_config(config)?)
            .with_topic_prefix(config.topic_prefix.clone()))
    }

    /// Change the destination prefix preceding the client segment
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Run this interceptor on one frame; see [`intercept`].
    ///
    /// # Errors
    ///
    /// Returns [`Forbidden`] when the frame must not be forwarded.
    pub async fn pre_send(&self, frame: Frame, session: &mut Session) -> Result<Frame, Forbidden> {
        intercept(self, frame, session).await
    }
}

#[async_trait]
impl FrameInterceptor for AuthInterceptor {
    async fn on_connect(&self, frame: &Frame, session: &mut Session) -> AuthResult<()> {
        let token = frame
            .first_header(TOKEN_HEADER)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential("no token header on CONNECT"))?;

        session.tokens_mut().set(token);

        // Claims are parsed, not verified; the policy below is what trusts them
        let claims = ClaimSet::decode(token)?;
        let issuer = claims
            .issuer()
            .ok_or_else(|| AuthError::UntrustedOrInactiveToken("token has no issuer".into()))?;
        let trust = self.policy.authorize(&issuer, token).await?;

        let identity = Identity::from_claims(&claims);
        debug!(
            issuer = %issuer,
            trust = ?trust,
            user = identity.display_name(),
            "Session authenticated"
        );
        session.authenticate(identity);
        Ok(())
    }

    async fn on_subscribe(&self, frame: &Frame, session: &Session) -> AuthResult<()> {
        let token = match (session.state(), session.tokens().get()) {
            (SessionState::Authenticated, Some(token)) => token,
            _ => {
                return Err(AuthError::MissingCredential(
                    "no authenticated token on session",
                ));
            }
        };

        let destination = frame
            .first_header(DESTINATION_HEADER)
            .ok_or(AuthError::MissingDestination)?;
        let client = client_segment(destination, &self.topic_prefix)?;

        // Claims are parsed, not verified; CONNECT already ran the issuer policy
        let audience = ClaimSet::decode(token)?
            .audience()
            .map(|aud| strip_list_decoration(&aud))
            .unwrap_or_default();

        if audience != client {
            return Err(AuthError::AudienceMismatch {
                audience,
                client: client.to_string(),
            });
        }

        debug!(destination, "Subscription authorized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tests::ScriptedIntrospector;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::{Value, json};
    use std::sync::Arc;

    const TRUSTED: &str = "https://trusted.example";

    fn token(claims: Value) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn interceptor(
        answer: Result<bool, IntrospectionError>,
    ) -> (AuthInterceptor, Arc<ScriptedIntrospector>) {
        let introspector = ScriptedIntrospector::answering(answer);
        let policy = IssuerTrustPolicy::new(TRUSTED, introspector.clone());
        (AuthInterceptor::new(policy), introspector)
    }

    fn connect(token: &str) -> Frame {
        Frame::new(StompCommand::Connect)
            .with_header("accept-version", "1.2")
            .with_header(TOKEN_HEADER, token)
    }

    fn subscribe(destination: &str) -> Frame {
        Frame::new(StompCommand::Subscribe)
            .with_header("id", "sub-0")
            .with_header(DESTINATION_HEADER, destination)
    }

    #[tokio::test]
    async fn test_connect_binds_identity() {
        let (interceptor, introspector) = interceptor(Ok(false));
        let mut session = Session::new();
        let token = token(json!({
            "iss": TRUSTED,
            "aud": "alpha",
            "email": "ada@example.com",
            "name": "Ada",
            "surname": "Lovelace",
        }));

        let frame = interceptor.pre_send(connect(&token), &mut session).await.unwrap();

        assert_eq!(frame.command(), StompCommand::Connect);
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.tokens().get(), Some(token.as_str()));
        let principal = session.principal().unwrap();
        assert_eq!(principal.display_name(), "Ada");
        assert_eq!(principal.email.as_deref(), Some("ada@example.com"));
        assert_eq!(introspector.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stomp_alias_requires_token() {
        let (interceptor, _) = interceptor(Ok(false));
        let mut session = Session::new();

        let frame = Frame::new(StompCommand::Stomp).with_header("accept-version", "1.2");
        assert_eq!(interceptor.pre_send(frame, &mut session).await, Err(Forbidden));
        assert_eq!(session.state(), SessionState::Rejected);
    }

    #[tokio::test]
    async fn test_missing_or_empty_token_is_forbidden() {
        let (interceptor, introspector) = interceptor(Ok(true));

        let mut session = Session::new();
        let frame = Frame::new(StompCommand::Connect);
        assert_eq!(interceptor.pre_send(frame, &mut session).await, Err(Forbidden));

        let mut session = Session::new();
        assert_eq!(
            interceptor.pre_send(connect(""), &mut session).await,
            Err(Forbidden)
        );
        assert_eq!(introspector.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_error_kind() {
        let (interceptor, _) = interceptor(Ok(true));
        let mut session = Session::new();
        let err = interceptor
            .on_connect(&Frame::new(StompCommand::Connect), &mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredential(_)));
        assert_eq!(session.tokens().get(), None);
    }

    #[tokio::test]
    async fn test_malformed_token_is_forbidden() {
        let (interceptor, _) = interceptor(Ok(true));
        let mut session = Session::new();
        assert_eq!(
            interceptor.pre_send(connect("not-a-token"), &mut session).await,
            Err(Forbidden)
        );
        assert_eq!(session.tokens().get(), None);
    }

    #[tokio::test]
    async fn test_token_without_issuer_is_forbidden() {
        let (interceptor, introspector) = interceptor(Ok(true));
        let mut session = Session::new();
        let err = interceptor
            .on_connect(&connect(&token(json!({"aud": "alpha"}))), &mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UntrustedOrInactiveToken(_)));
        assert_eq!(introspector.call_count(), 0);
    }

    #[tokio::test]
    async fn test_external_issuer_is_introspected() {
        let (interceptor, introspector) = interceptor(Ok(true));
        let mut session = Session::new();
        let token = token(json!({"iss": "https://other.example", "aud": "alpha"}));

        assert!(interceptor.pre_send(connect(&token), &mut session).await.is_ok());
        assert_eq!(
            introspector.calls.lock().unwrap().as_slice(),
            &[(token.clone(), "https://other.example".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_connect_clears_token_and_rejects() {
        let (interceptor, _) = interceptor(Ok(false));
        let mut session = Session::new();
        let token = token(json!({"iss": "https://other.example", "aud": "alpha"}));

        assert_eq!(
            interceptor.pre_send(connect(&token), &mut session).await,
            Err(Forbidden)
        );
        assert_eq!(session.state(), SessionState::Rejected);
        assert_eq!(session.tokens().get(), None);
        assert!(session.principal().is_none());

        // Terminal: even an unrelated frame is refused now
        let send = Frame::new(StompCommand::Send).with_header("destination", "/topic/alpha/x");
        assert_eq!(interceptor.pre_send(send, &mut session).await, Err(Forbidden));
    }

    #[tokio::test]
    async fn test_subscribe_checks_audience() {
        let (interceptor, _) = interceptor(Ok(false));
        let mut session = Session::new();
        let token = token(json!({"iss": TRUSTED, "aud": ["alpha"]}));
        interceptor.pre_send(connect(&token), &mut session).await.unwrap();

        assert!(
            interceptor
                .pre_send(subscribe("/topic/alpha/messages"), &mut session)
                .await
                .is_ok()
        );

        let err = interceptor
            .on_subscribe(&subscribe("/topic/beta/messages"), &session)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::AudienceMismatch {
                audience: "alpha".into(),
                client: "beta".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_subscribe_error_kinds() {
        let (interceptor, _) = interceptor(Ok(false));
        let mut session = Session::new();

        let err = interceptor
            .on_subscribe(&subscribe("/topic/alpha/messages"), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredential(_)));

        let token = token(json!({"iss": TRUSTED, "aud": "alpha"}));
        interceptor.pre_send(connect(&token), &mut session).await.unwrap();

        let no_destination = Frame::new(StompCommand::Subscribe).with_header("id", "1");
        assert_eq!(
            interceptor.on_subscribe(&no_destination, &session).await,
            Err(AuthError::MissingDestination)
        );
        assert_eq!(
            interceptor.on_subscribe(&subscribe("/topic/alpha"), &session).await,
            Err(AuthError::InvalidDestination("/topic/alpha".into()))
        );
    }

    #[tokio::test]
    async fn test_multi_audience_never_matches_single_segment() {
        let (interceptor, _) = interceptor(Ok(false));
        let mut session = Session::new();
        let token = token(json!({"iss": TRUSTED, "aud": ["alpha", "beta"]}));
        interceptor.pre_send(connect(&token), &mut session).await.unwrap();

        assert_eq!(
            interceptor
                .pre_send(subscribe("/topic/alpha/messages"), &mut session)
                .await,
            Err(Forbidden)
        );
    }

    #[tokio::test]
    async fn test_missing_audience_is_forbidden() {
        let (interceptor, _) = interceptor(Ok(false));
        let mut session = Session::new();
        let token = token(json!({"iss": TRUSTED}));
        interceptor.pre_send(connect(&token), &mut session).await.unwrap();

        assert!(matches!(
            interceptor
                .on_subscribe(&subscribe("/topic/alpha/messages"), &session)
                .await,
            Err(AuthError::AudienceMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_commands_pass_through() {
        let (interceptor, _) = interceptor(Ok(false));
        let mut session = Session::new();

        for command in [
            StompCommand::Send,
            StompCommand::Unsubscribe,
            StompCommand::Ack,
            StompCommand::Disconnect,
        ] {
            let frame = Frame::new(command).with_header("x", "y").with_body("payload");
            let forwarded = interceptor.pre_send(frame.clone(), &mut session).await.unwrap();
            assert_eq!(forwarded, frame);
        }
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_custom_topic_prefix() {
        let (interceptor, _) = interceptor(Ok(false));
        let interceptor = interceptor.with_topic_prefix("/queue/");
        let mut session = Session::new();
        let token = token(json!({"iss": TRUSTED, "aud": "alpha"}));
        interceptor.pre_send(connect(&token), &mut session).await.unwrap();

        assert!(
            interceptor
                .pre_send(subscribe("/queue/alpha/inbox"), &mut session)
                .await
                .is_ok()
        );
    }
}
