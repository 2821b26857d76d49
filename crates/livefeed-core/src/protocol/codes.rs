//! Stable error codes carried by error frames.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};

/// Machine-readable error code sent to peers.
///
/// Codes are part of the wire contract; never rename a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed frame or unknown entity type.
    InvalidInput,
    /// Operation requires an authenticated connection.
    Unauthorized,
    /// Token was invalid, expired, or revoked.
    InvalidToken,
    /// A per-connection limit was reached.
    LimitExceeded,
    /// The server failed to process the request.
    Internal,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation | ErrorKind::Serialization => Self::InvalidInput,
            ErrorKind::Authorization => Self::Unauthorized,
            ErrorKind::Authentication => Self::InvalidToken,
            ErrorKind::LimitExceeded => Self::LimitExceeded,
            _ => Self::Internal,
        }
    }
}

/// Code plus human-readable message, as embedded in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl ErrorFrame {
    /// Creates an error frame.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&AppError> for ErrorFrame {
    fn from(err: &AppError) -> Self {
        let code = ErrorCode::from(err.kind);
        // Internal failures never leak their detail to peers.
        let message = match code {
            ErrorCode::Internal => "Internal error".to_string(),
            ErrorCode::InvalidToken => "Authentication failed".to_string(),
            _ => err.message.clone(),
        };
        Self { code, message }
    }
}
