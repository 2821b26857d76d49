//! Token verification failures.

use livefeed_core::error::AppError;
use thiserror::Error;

/// Classification of a failed token operation.
///
/// Callers only ever see one of these coarse variants; the precise reason a
/// signature or claim check failed is logged, never returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Malformed, wrongly signed, wrong algorithm, or wrong token type.
    #[error("Invalid token")]
    InvalidToken,
    /// Past its expiry.
    #[error("Token has expired")]
    Expired,
    /// Unknown to the registry, already rotated, or explicitly revoked.
    #[error("Token has been revoked")]
    Revoked,
    /// Registry record belongs to a different subject.
    #[error("Token subject mismatch")]
    SubjectMismatch,
    /// Signing failed.
    #[error("Failed to sign token")]
    Signing,
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing => AppError::internal(err.to_string()),
            _ => AppError::authentication(err.to_string()),
        }
    }
}
