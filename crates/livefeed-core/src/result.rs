//! Convenience result type alias for LiveFeed.

use crate::error::AppError;

/// A specialized `Result` type for LiveFeed operations.
pub type AppResult<T> = Result<T, AppError>;
