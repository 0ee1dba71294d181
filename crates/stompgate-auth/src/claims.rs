//! Structural claims decoding for compact bearer tokens
//!
//! # Security
//!
//! **This module parses tokens. It does not verify them.** The signature
//! segment is never checked, so [`ClaimSet::decode`] accepts any syntactically
//! valid token, including one forged by the caller. Trust is established only
//! by the issuer policy in [`crate::policy`], which either recognizes the
//! locally trusted issuer or asks the issuer's introspection endpoint whether
//! the token is active. Never act on claims decoded here without running that
//! policy first.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

use crate::error::{AuthError, AuthResult};

/// Issuer claim name
pub const ISSUER: &str = "iss";
/// Audience claim name
pub const AUDIENCE: &str = "aud";
/// Email claim name
pub const EMAIL: &str = "email";
/// Given name claim name
pub const NAME: &str = "name";
/// Family name claim name
pub const SURNAME: &str = "surname";

/// Claims carried in a token payload, decoded without signature verification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClaimSet {
    claims: Map<String, Value>,
}

impl ClaimSet {
    /// Decode the payload of a compact `header.payload.signature` token.
    ///
    /// **No signature verification is performed.** See the module docs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] when the token does not have three
    /// segments, the header is not a JOSE header, or the payload is not a
    /// base64url-encoded JSON object.
    pub fn decode(token: &str) -> AuthResult<Self> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(AuthError::MalformedToken(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        // Header is only checked for shape; the algorithm it names is never used
        jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::MalformedToken(format!("invalid header: {}", e)))?;

        let payload = URL_SAFE_NO_PAD
            .decode(segments[1].trim_end_matches('='))
            .map_err(|e| AuthError::MalformedToken(format!("invalid payload encoding: {}", e)))?;

        match serde_json::from_slice::<Value>(&payload) {
            Ok(Value::Object(claims)) => Ok(Self { claims }),
            Ok(_) => Err(AuthError::MalformedToken(
                "payload is not a JSON object".to_string(),
            )),
            Err(e) => Err(AuthError::MalformedToken(format!(
                "invalid payload JSON: {}",
                e
            ))),
        }
    }

    /// Issuer (`iss`) claim
    pub fn issuer(&self) -> Option<String> {
        self.claim(ISSUER)
    }

    /// Audience (`aud`) claim.
    ///
    /// A list-valued audience is rendered as `[a, b]`, so callers comparing a
    /// single audience must strip the list decoration (see
    /// [`strip_list_decoration`]).
    pub fn audience(&self) -> Option<String> {
        self.claim(AUDIENCE)
    }

    /// Any claim rendered as a string.
    ///
    /// Strings are returned as-is, lists as `[a, b]`, other scalars through
    /// their JSON text. `null` counts as absent.
    pub fn claim(&self, name: &str) -> Option<String> {
        match self.claims.get(name)? {
            Value::Null => None,
            value => Some(render(value)),
        }
    }

    /// All claims
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }
}

impl From<Map<String, Value>> for ClaimSet {
    fn from(claims: Map<String, Value>) -> Self {
        Self { claims }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

/// Remove every `[` and `]` from a rendered claim value
pub fn strip_list_decoration(value: &str) -> String {
    value.replace(['[', ']'], "")
}
