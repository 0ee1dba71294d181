//! Basic-auth credential encoding for the introspection client

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encode `client_id:client_secret` as standard Base64 for an
/// `Authorization: Basic` header.
pub fn encode_credentials(client_id: &str, client_secret: &str) -> String {
    STANDARD.encode(format!("{}:{}", client_id, client_secret))
}

/// Full `Authorization` header value, `Basic ` prefix included
pub fn basic_authorization(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", encode_credentials(client_id, client_secret))
}
