//! Token endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::debug;

use livefeed_auth::TokenPair;

use crate::dto::RefreshRequest;
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /api/auth/refresh
///
/// Exchanges a refresh token for a new pair. The presented token is consumed.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let pair = state.realtime.tokens.rotate(&req.refresh_token)?;
    Ok(Json(pair))
}

/// POST /api/auth/revoke
///
/// Idempotent: an already-consumed token still yields 204.
pub async fn revoke(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<StatusCode> {
    let removed = state.realtime.tokens.revoke(&req.refresh_token)?;
    debug!(removed, "Refresh token revocation");
    Ok(StatusCode::NO_CONTENT)
}
