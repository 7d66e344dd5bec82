use serde::{Deserialize, Serialize};

/// Lifetime of a magic link, in milliseconds.
pub const MAGIC_LINK_TTL_MS: i64 = 15 * 60 * 1000;

/// A freshly issued magic link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLinkToken {
    pub token: String,
    pub email: String,
    /// Epoch milliseconds after which the token is rejected.
    pub expires_at: i64,
}

impl MagicLinkToken {
    pub fn payload(&self) -> MagicLinkPayload {
        MagicLinkPayload {
            email: self.email.clone(),
            expires: self.expires_at,
        }
    }
}

/// The value kept in a token store under the token key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicLinkPayload {
    pub email: String,
    pub expires: i64,
}

impl MagicLinkPayload {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires
    }
}

/// Outgoing message handed to the email collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLinkEmail {
    pub email: String,
    pub url: String,
    pub host: String,
}
