//! Client segment parsing for subscription destinations
//!
//! Topic destinations have the shape `<prefix><client>/<rest>`, for example
//! `/topic/notification-client/messages`. The client segment is what a
//! subscriber's token audience must equal.

use crate::error::{AuthError, AuthResult};

/// Prefix of broker topic destinations
pub const DEFAULT_TOPIC_PREFIX: &str = "/topic/";

/// Extract the client segment of `destination`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidDestination`] unless the destination starts with
/// `prefix`, followed by a non-empty segment and a `/`.
pub fn client_segment<'a>(destination: &'a str, prefix: &str) -> AuthResult<&'a str> {
    let rest = destination
        .strip_prefix(prefix)
        .ok_or_else(|| AuthError::InvalidDestination(destination.to_string()))?;

    match rest.split_once('/') {
        Some((segment, _)) if !segment.is_empty() => Ok(segment),
        _ => Err(AuthError::InvalidDestination(destination.to_string())),
    }
}
