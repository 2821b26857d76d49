//! Connection authentication backed by the token service.

use std::sync::Arc;

use async_trait::async_trait;

use livefeed_auth::TokenService;
use livefeed_core::result::AppResult;
use livefeed_core::types::Subject;

use crate::handler::AuthHandler;

/// Authenticates connections with access tokens.
#[derive(Clone)]
pub struct TokenAuthenticator {
    /// Token service.
    tokens: Arc<TokenService>,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator").finish()
    }
}

impl TokenAuthenticator {
    /// Creates a new authenticator.
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl AuthHandler for TokenAuthenticator {
    async fn authenticate(&self, token: &str) -> AppResult<Subject> {
        self.tokens.verify_access(token).map_err(|e| {
            tracing::debug!(reason = %e, "Connection token rejected");
            e.into()
        })
    }
}
