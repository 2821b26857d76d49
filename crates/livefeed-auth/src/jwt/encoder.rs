//! Token creation with HS256 signing and configurable TTLs.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

use livefeed_core::config::AuthConfig;
use livefeed_core::types::Subject;

use crate::error::TokenError;

use super::claims::{Claims, TokenType};

/// Signs access and refresh tokens.
#[derive(Clone)]
pub struct JwtEncoder {
    /// HMAC secret key for signing.
    encoding_key: EncodingKey,
    /// Header with the one algorithm this service signs with.
    header: Header,
    /// Access token lifetime.
    access_ttl: Duration,
    /// Refresh token lifetime.
    refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            header: Header::new(Algorithm::HS256),
            access_ttl: Duration::minutes(config.access_ttl_minutes as i64),
            refresh_ttl: Duration::hours(config.refresh_ttl_hours as i64),
        }
    }

    /// Builds fresh access claims for `subject`.
    pub fn access_claims(&self, subject: &Subject, now: DateTime<Utc>) -> Claims {
        Claims::new(subject, TokenType::Access, now, now + self.access_ttl)
    }

    /// Builds fresh refresh claims for `subject`.
    pub fn refresh_claims(&self, subject: &Subject, now: DateTime<Utc>) -> Claims {
        Claims::new(subject, TokenType::Refresh, now, now + self.refresh_ttl)
    }

    /// Signs arbitrary claims.
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&self.header, claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign token");
            TokenError::Signing
        })
    }
}
