//! Request DTOs.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/auth/refresh` and `POST /api/auth/revoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh token.
    pub refresh_token: String,
}
