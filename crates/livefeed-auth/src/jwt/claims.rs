//! Claims structure shared by access and refresh tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use livefeed_core::types::{Role, Subject, TokenId};

/// Claims payload embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id.
    pub sub: String,
    /// Role at the time of issuance.
    pub role: Role,
    /// Unique token id; keys the refresh registry and the access denylist.
    pub jti: TokenId,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Token type marker: "access" or "refresh".
    pub token_type: TokenType,
}

/// Distinguishes access tokens from refresh tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived bearer token.
    Access,
    /// Single-use token exchanged for a new pair.
    Refresh,
}

impl Claims {
    /// Builds claims for `subject` valid from `issued_at` until `expires_at`.
    pub fn new(
        subject: &Subject,
        token_type: TokenType,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: subject.id.clone(),
            role: subject.role,
            jti: TokenId::new(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            token_type,
        }
    }

    /// Returns the subject these claims speak for.
    pub fn subject(&self) -> Subject {
        Subject::new(self.sub.clone(), self.role)
    }

    /// Returns the expiration as a `DateTime<Utc>`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    /// Checks whether these claims have expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}
