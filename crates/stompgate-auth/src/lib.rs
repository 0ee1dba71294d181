//! # stompgate-auth
//!
//! Bearer-token authentication and per-topic authorization for STOMP sessions.
//!
//! Clients present a token in the `token` header of their CONNECT frame. The
//! interceptor decodes its claims, trusts tokens from the locally configured
//! issuer outright, asks any other issuer's introspection endpoint whether the
//! token is active, and binds an [`Identity`] to the connection's [`Session`].
//! Each later SUBSCRIBE is allowed only when the client segment of its
//! destination (`/topic/<client>/...`) equals the token's audience.
//!
//! ## Security model
//!
//! Token signatures are **not** verified anywhere in this crate. The claims
//! decoder is a parser; trust comes only from the issuer policy. Keep that
//! policy in front of every use of decoded claims.
//!
//! ## Architecture
//!
//! - [`claims`] - Structural token decoding (no signature verification)
//! - [`credentials`] - Basic-auth encoding of client credentials
//! - [`introspection`] - RFC 7662 introspection client
//! - [`policy`] - Trusted-issuer vs. introspected-issuer decision
//! - [`session`] - Per-connection token context and state
//! - [`interceptor`] - CONNECT / SUBSCRIBE checks
//! - [`frame`] - STOMP 1.2 frames
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stompgate_auth::{AuthConfig, AuthInterceptor, Frame, Session};
//!
//! # async fn example(raw: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new("https://auth.example.com", "notification-client", "secret");
//! let interceptor = AuthInterceptor::from_config(&config)?;
//!
//! // One session per connection, owned by that connection
//! let mut session = Session::new();
//!
//! if let Some(frame) = Frame::parse(raw)? {
//!     match interceptor.pre_send(frame, &mut session).await {
//!         Ok(frame) => { /* forward to the broker */ }
//!         Err(forbidden) => { /* send forbidden.into_error_frame() and close */ }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod config;
pub mod credentials;
pub mod destination;
pub mod error;
pub mod frame;
pub mod identity;
pub mod interceptor;
pub mod introspection;
pub mod policy;
pub mod session;

#[doc(inline)]
pub use claims::ClaimSet;
#[doc(inline)]
pub use config::{AuthConfig, IntrospectionConfig};
#[doc(inline)]
pub use error::{AuthError, AuthResult, Forbidden};
#[doc(inline)]
pub use frame::{Frame, FrameError, StompCommand};
#[doc(inline)]
pub use identity::Identity;
#[doc(inline)]
pub use interceptor::{AuthInterceptor, FrameInterceptor, intercept};
#[doc(inline)]
pub use introspection::{IntrospectionClient, IntrospectionError, Introspector};
#[doc(inline)]
pub use policy::{IssuerTrust, IssuerTrustPolicy};
#[doc(inline)]
pub use session::{Session, SessionId, SessionState, SessionTokenContext};
