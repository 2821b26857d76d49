//! Shared fixtures for unit tests.

use std::sync::Arc;

use async_trait::async_trait;

use livefeed_core::config::RealtimeConfig;
use livefeed_core::error::AppError;
use livefeed_core::protocol::OutboundMessage;
use livefeed_core::result::AppResult;
use livefeed_core::types::{Role, Subject};

use crate::channel::registry::SubscriptionRegistry;
use crate::connection::registry::{AcceptedConnection, ConnectionRegistry};
use crate::handler::AuthHandler;
use crate::metrics::RealtimeMetrics;

/// Accepts `good-<id>` tokens as customer `<id>`.
pub(crate) struct StaticAuth;

#[async_trait]
impl AuthHandler for StaticAuth {
    async fn authenticate(&self, token: &str) -> AppResult<Subject> {
        token
            .strip_prefix("good-")
            .map(|id| Subject::new(id, Role::Customer))
            .ok_or_else(|| AppError::authentication("Invalid token"))
    }
}

pub(crate) struct Fixture {
    pub registry: Arc<ConnectionRegistry>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub metrics: Arc<RealtimeMetrics>,
}

pub(crate) fn fixture() -> Fixture {
    fixture_with(RealtimeConfig::default())
}

pub(crate) fn fixture_with(config: RealtimeConfig) -> Fixture {
    let subscriptions = Arc::new(SubscriptionRegistry::new(&config));
    let metrics = Arc::new(RealtimeMetrics::new());
    let registry = Arc::new(ConnectionRegistry::new(
        config,
        Arc::new(StaticAuth),
        subscriptions.clone(),
        metrics.clone(),
    ));
    Fixture {
        registry,
        subscriptions,
        metrics,
    }
}

/// Takes every frame currently queued for a connection.
pub(crate) fn drain(conn: &mut AcceptedConnection) -> Vec<OutboundMessage> {
    let mut frames = Vec::new();
    while let Ok(frame) = conn.outbound.try_recv() {
        frames.push(frame);
    }
    frames
}
