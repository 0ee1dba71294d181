//! Authenticated identity bound to a session

use serde::{Deserialize, Serialize};

use crate::claims::{self, ClaimSet};

/// The principal established by a successful CONNECT.
///
/// Built once from the token's claims and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    /// `email` claim
    pub email: Option<String>,
    /// `name` claim, also the display name
    pub name: Option<String>,
    /// `surname` claim
    pub surname: Option<String>,
}

impl Identity {
    /// Build an identity from decoded claims
    pub fn from_claims(claims: &ClaimSet) -> Self {
        Self {
            email: claims.claim(claims::EMAIL),
            name: claims.claim(claims::NAME),
            surname: claims.claim(claims::SURNAME),
        }
    }

    /// Name shown to other participants
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}
