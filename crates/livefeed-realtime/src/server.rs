//! Top-level real-time engine that ties together all subsystems.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use livefeed_auth::{TokenService, spawn_sweeper};
use livefeed_core::config::{AuthConfig, RealtimeConfig};
use livefeed_core::error::AppError;
use livefeed_core::events::ChangeEvent;
use livefeed_core::result::AppResult;

use crate::bridge::change_feed::{ChangeFeed, spawn_dispatch_loop};
use crate::channel::registry::SubscriptionRegistry;
use crate::connection::authenticator::TokenAuthenticator;
use crate::connection::heartbeat::run_heartbeat;
use crate::connection::registry::ConnectionRegistry;
use crate::metrics::{MetricsSnapshot, RealtimeMetrics};
use crate::notification::dispatcher::EventDispatcher;

/// Point-in-time view of the engine for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    /// Live connections.
    pub connections: usize,
    /// Distinct authenticated subjects.
    pub subjects: usize,
    /// Topics with at least one subscriber.
    pub topics: usize,
    /// Outstanding refresh tokens.
    pub refresh_tokens: usize,
    /// Counters.
    pub metrics: MetricsSnapshot,
}

/// Central real-time engine that coordinates all subsystems.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Token service.
    pub tokens: Arc<TokenService>,
    /// Connection registry.
    pub connections: Arc<ConnectionRegistry>,
    /// Subscription registry.
    pub subscriptions: Arc<SubscriptionRegistry>,
    /// Event dispatcher.
    pub dispatcher: Arc<EventDispatcher>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    /// Producer side of the change feed.
    change_feed: ChangeFeed,
    /// Consumer side, taken by [`RealtimeEngine::start`].
    feed_rx: Arc<Mutex<Option<mpsc::Receiver<ChangeEvent>>>>,
    /// Background tasks spawned by `start`.
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// Cancelled on shutdown.
    shutdown: CancellationToken,
    /// Engine configuration.
    config: RealtimeConfig,
    /// Interval between token registry sweeps.
    token_sweep_interval: Duration,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Creates a new real-time engine with all subsystems.
    pub fn new(config: RealtimeConfig, auth: &AuthConfig) -> Self {
        let tokens = Arc::new(TokenService::new(auth));
        let metrics = Arc::new(RealtimeMetrics::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new(&config));
        let connections = Arc::new(ConnectionRegistry::new(
            config.clone(),
            Arc::new(TokenAuthenticator::new(tokens.clone())),
            subscriptions.clone(),
            metrics.clone(),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            subscriptions.clone(),
            connections.clone(),
            metrics.clone(),
        ));
        let (change_feed, feed_rx) = ChangeFeed::channel(config.change_feed_capacity);

        info!("Real-time engine initialized");

        Self {
            tokens,
            connections,
            subscriptions,
            dispatcher,
            metrics,
            change_feed,
            feed_rx: Arc::new(Mutex::new(Some(feed_rx))),
            tasks: Arc::new(Mutex::new(Vec::new())),
            shutdown: CancellationToken::new(),
            config,
            token_sweep_interval: Duration::from_secs(auth.sweep_interval_seconds),
        }
    }

    /// Spawns the heartbeat, change-feed dispatch, and token sweep tasks.
    pub fn start(&self) -> AppResult<()> {
        let feed_rx = self
            .feed_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| AppError::internal("Real-time engine already started"))?;

        let subscriptions = self.subscriptions.clone();
        let heartbeat = tokio::spawn(run_heartbeat(
            self.connections.clone(),
            self.config.heartbeat_interval(),
            self.shutdown.child_token(),
            move |_| {
                subscriptions.ensure_consistent();
            },
        ));
        let dispatch = spawn_dispatch_loop(
            feed_rx,
            self.dispatcher.clone(),
            self.shutdown.child_token(),
        );
        let sweeper = spawn_sweeper(
            self.tokens.clone(),
            self.token_sweep_interval,
            self.shutdown.child_token(),
        );

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([heartbeat, dispatch, sweeper]);

        info!(
            heartbeat_secs = self.config.heartbeat_interval_seconds,
            stale_secs = self.config.stale_timeout_seconds,
            "Real-time engine started"
        );
        Ok(())
    }

    /// Handle for store writers.
    pub fn change_feed(&self) -> ChangeFeed {
        self.change_feed.clone()
    }

    /// Token cancelled when the engine shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Revokes every refresh token of a subject and closes its connections.
    ///
    /// Returns `(revoked_tokens, closed_connections)`.
    pub fn sign_out(&self, subject_id: &str) -> (usize, usize) {
        let revoked = self.tokens.revoke_all(subject_id);
        let closed = self.connections.terminate_subject(subject_id);
        info!(subject_id = %subject_id, revoked, closed, "Subject signed out");
        (revoked, closed)
    }

    /// Current engine status.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            connections: self.connections.connection_count(),
            subjects: self.connections.subject_count(),
            topics: self.subscriptions.topic_count(),
            refresh_tokens: self.tokens.outstanding_refresh_tokens(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Initiates a graceful shutdown of the real-time engine.
    pub async fn shutdown(&self) -> AppResult<()> {
        info!("Shutting down real-time engine");

        // Signal all tasks to stop
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        let closed = self.connections.close_all();

        info!(closed, "Real-time engine shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefeed_core::protocol::OutboundMessage;
    use livefeed_core::types::{EntityId, EntityType, Role, Subject};
    use serde_json::json;

    use crate::channel::subscription::SubscribeRequest;

    fn engine() -> RealtimeEngine {
        RealtimeEngine::new(RealtimeConfig::default(), &AuthConfig::default())
    }

    #[tokio::test]
    async fn test_end_to_end_through_change_feed() {
        let engine = engine();
        engine.start().unwrap();

        let pair = engine
            .tokens
            .issue(&Subject::new("u1", Role::Customer))
            .unwrap();
        let mut conn = engine.connections.accept();
        engine
            .connections
            .authenticate(conn.id, &pair.access_token)
            .await
            .unwrap();
        engine
            .connections
            .subscribe_connection(
                conn.id,
                SubscribeRequest::entity_type(EntityType::Order).with_id(EntityId::from(42)),
            )
            .unwrap();
        assert!(matches!(
            conn.outbound.recv().await,
            Some(OutboundMessage::AuthResponse { success: true, .. })
        ));

        let feed = engine.change_feed();
        feed.updated(EntityType::Order, EntityId::from(7), json!({"status": "x"}))
            .await
            .unwrap();
        feed.updated(EntityType::Order, EntityId::from(42), json!({"status": "shipped"}))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), conn.outbound.recv())
            .await
            .unwrap()
            .unwrap();
        match frame {
            OutboundMessage::Event { entity_id, .. } => assert_eq!(entity_id.as_str(), "42"),
            other => panic!("unexpected frame: {other:?}"),
        }

        engine.shutdown().await.unwrap();
        assert!(conn.closed.is_cancelled());
        assert_eq!(engine.status().connections, 0);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let engine = engine();
        engine.start().unwrap();
        assert!(engine.start().is_err());
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_out_revokes_and_disconnects() {
        let engine = engine();
        let subject = Subject::new("u9", Role::Customer);
        let pair = engine.tokens.issue(&subject).unwrap();
        let conn = engine.connections.accept();
        engine
            .connections
            .authenticate(conn.id, &pair.access_token)
            .await
            .unwrap();

        assert_eq!(engine.sign_out("u9"), (1, 1));
        assert!(conn.closed.is_cancelled());
        assert!(engine.tokens.rotate(&pair.refresh_token).is_err());
    }
}
