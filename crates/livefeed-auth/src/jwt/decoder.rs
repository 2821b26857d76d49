//! Token verification against a fixed algorithm allow-list.

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use livefeed_core::config::AuthConfig;

use crate::error::TokenError;

use super::claims::{Claims, TokenType};

/// Verifies token signatures, expiry, and type markers.
#[derive(Clone)]
pub struct JwtDecoder {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
    /// Same checks minus `exp`; only used to find a lapsed refresh record.
    lapsed: Validation,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Only HS256 is accepted, whatever the token header claims.
        validation.algorithms = vec![Algorithm::HS256];
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let mut lapsed = validation.clone();
        lapsed.validate_exp = false;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            lapsed,
        }
    }

    /// Decodes an access token.
    pub fn decode_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_typed(token, TokenType::Access)
    }

    /// Decodes a refresh token; rejects tokens without the refresh marker.
    pub fn decode_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_typed(token, TokenType::Refresh)
    }

    /// Decodes a refresh token whose `exp` may have passed.
    ///
    /// Signature, algorithm and type are still enforced.
    pub fn decode_refresh_lapsed(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_with(token, &self.lapsed)?;
        Self::check_type(claims, TokenType::Refresh)
    }

    fn decode_typed(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.decode_with(token, &self.validation)?;
        Self::check_type(claims, expected)
    }

    fn check_type(claims: Claims, expected: TokenType) -> Result<Claims, TokenError> {
        if claims.token_type != expected {
            tracing::debug!(
                expected = ?expected,
                actual = ?claims.token_type,
                "Token type mismatch"
            );
            return Err(TokenError::InvalidToken);
        }
        Ok(claims)
    }

    fn decode_with(&self, token: &str, validation: &Validation) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                other => {
                    tracing::debug!(reason = ?other, "Token rejected");
                    TokenError::InvalidToken
                }
            })
    }
}
