//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use livefeed_core::config::AppConfig;
use livefeed_realtime::RealtimeEngine;

/// Shared application state, cloned into every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Real-time engine: tokens, connections, subscriptions, dispatch.
    pub realtime: Arc<RealtimeEngine>,
}

impl AppState {
    /// Builds the state and a fresh engine from configuration.
    pub fn new(config: AppConfig) -> Self {
        let realtime = Arc::new(RealtimeEngine::new(config.realtime.clone(), &config.auth));
        Self::with_engine(config, realtime)
    }

    /// Builds the state around an existing engine.
    pub fn with_engine(config: AppConfig, realtime: Arc<RealtimeEngine>) -> Self {
        Self {
            config: Arc::new(config),
            realtime,
        }
    }
}
