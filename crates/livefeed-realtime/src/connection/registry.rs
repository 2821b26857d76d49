//! Connection registry: connection lifecycle, authentication, and inbound
//! message routing.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livefeed_core::config::RealtimeConfig;
use livefeed_core::error::AppError;
use livefeed_core::protocol::{
    ErrorCode, ErrorFrame, InboundMessage, KindFilter, OutboundMessage, now_millis,
};
use livefeed_core::result::AppResult;
use livefeed_core::types::{ConnectionId, EntityId, EntityType, Subject};

use crate::channel::filter::FilterExpr;
use crate::channel::subscription::{SubscribeRequest, Subscription};
use crate::channel::topic::TopicKey;
use crate::handler::{AuthHandler, Subscriber, SubscriptionHandler};
use crate::message::validate_inbound;
use crate::metrics::RealtimeMetrics;

use super::handle::{ConnectionHandle, SendFailure};
use super::heartbeat::HeartbeatSweep;
use super::pool::ConnectionPool;

/// The registry's view of a freshly accepted transport.
///
/// The socket task drains `outbound` to the peer and stops once `closed`
/// fires.
#[derive(Debug)]
pub struct AcceptedConnection {
    /// Connection id.
    pub id: ConnectionId,
    /// Frames to write to the peer.
    pub outbound: mpsc::Receiver<OutboundMessage>,
    /// Cancelled when the registry terminates the connection.
    pub closed: CancellationToken,
}

/// Tracks every live connection.
pub struct ConnectionRegistry {
    /// Connection pool.
    pool: ConnectionPool,
    /// Token verification.
    auth: Arc<dyn AuthHandler>,
    /// Subscription bookkeeping.
    subscriptions: Arc<dyn SubscriptionHandler>,
    /// Metrics.
    metrics: Arc<RealtimeMetrics>,
    /// Configuration.
    config: RealtimeConfig,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("pool", &self.pool)
            .finish()
    }
}

impl ConnectionRegistry {
    /// Creates a new connection registry.
    pub fn new(
        config: RealtimeConfig,
        auth: Arc<dyn AuthHandler>,
        subscriptions: Arc<dyn SubscriptionHandler>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            pool: ConnectionPool::new(),
            auth,
            subscriptions,
            metrics,
            config,
        }
    }

    /// Registers a new, unauthenticated connection.
    pub fn accept(&self) -> AcceptedConnection {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let closed = CancellationToken::new();
        let handle = Arc::new(ConnectionHandle::new(tx, closed.clone()));
        let id = handle.id;

        self.pool.add(handle);
        self.metrics.connection_opened();
        info!(conn_id = %id, "Connection accepted");

        AcceptedConnection {
            id,
            outbound: rx,
            closed,
        }
    }

    /// Authenticates a connection with an access token.
    ///
    /// The outcome is also reported to the peer. A failed attempt leaves the
    /// connection open and unchanged.
    pub async fn authenticate(&self, conn_id: ConnectionId, token: &str) -> AppResult<Subject> {
        let handle = self
            .pool
            .get(&conn_id)
            .ok_or_else(|| AppError::not_found("Unknown connection"))?;

        let subject = match self.auth.authenticate(token).await {
            Ok(subject) => subject,
            Err(e) => {
                warn!(conn_id = %conn_id, "Connection authentication failed");
                self.deliver(
                    &handle,
                    OutboundMessage::AuthResponse {
                        success: false,
                        message: "Authentication failed".to_string(),
                    },
                );
                return Err(e);
            }
        };

        let previous = handle.set_subject(subject.clone());
        self.pool.bind_subject(
            conn_id,
            previous.as_ref().map(|s| s.id.as_str()),
            &subject.id,
        );
        if !handle.is_open() {
            // Lost a race with terminate; do not leave the subject index dangling.
            self.pool.unbind_subject(conn_id, &subject.id);
            return Err(AppError::transport("Connection is closing"));
        }

        info!(
            conn_id = %conn_id,
            subject_id = %subject.id,
            role = %subject.role,
            "Connection authenticated"
        );
        self.deliver(
            &handle,
            OutboundMessage::AuthResponse {
                success: true,
                message: "Authenticated".to_string(),
            },
        );
        Ok(subject)
    }

    /// Queues a frame for one connection. Never fails for a dead peer.
    pub fn send(&self, conn_id: ConnectionId, msg: OutboundMessage) -> bool {
        match self.pool.get(&conn_id) {
            Some(handle) => self.deliver(&handle, msg),
            None => false,
        }
    }

    /// Queues a frame for each connection, returning how many accepted it.
    pub fn broadcast<I>(&self, conn_ids: I, msg: &OutboundMessage) -> usize
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        conn_ids
            .into_iter()
            .filter(|conn_id| self.send(*conn_id, msg.clone()))
            .count()
    }

    fn deliver(&self, handle: &ConnectionHandle, msg: OutboundMessage) -> bool {
        match handle.try_send(msg) {
            Ok(()) => {
                self.metrics.message_sent();
                true
            }
            Err(SendFailure::NotOpen) => false,
            Err(failure) => {
                debug!(conn_id = %handle.id, failure = ?failure, "Dropped outbound frame");
                self.metrics.message_dropped();
                false
            }
        }
    }

    /// Terminates a connection: purges its subscriptions, removes it, and
    /// force-closes the transport. Returns `false` if it was already gone.
    pub fn terminate(&self, conn_id: ConnectionId) -> bool {
        let Some(handle) = self.pool.get(&conn_id) else {
            return false;
        };
        if !handle.begin_close() {
            return false;
        }

        let purged = self.subscriptions.unsubscribe_all(conn_id);
        self.pool.remove(&conn_id);
        handle.finish_close();
        self.metrics.connection_closed();

        info!(conn_id = %conn_id, purged, "Connection terminated");
        true
    }

    /// Terminates every connection authenticated as `subject_id`.
    pub fn terminate_subject(&self, subject_id: &str) -> usize {
        let terminated = self
            .pool
            .subject_connections(subject_id)
            .into_iter()
            .filter(|conn_id| self.terminate(*conn_id))
            .count();
        if terminated > 0 {
            info!(subject_id = %subject_id, terminated, "Terminated subject connections");
        }
        terminated
    }

    /// Terminates every connection.
    pub fn close_all(&self) -> usize {
        let closed = self
            .pool
            .all_connections()
            .iter()
            .filter(|handle| self.terminate(handle.id))
            .count();
        info!(count = closed, "All connections closed");
        closed
    }

    /// Records inbound activity on a connection.
    pub fn touch(&self, conn_id: ConnectionId) {
        if let Some(handle) = self.pool.get(&conn_id) {
            handle.touch();
        }
    }

    /// Runs one heartbeat sweep against the current time.
    pub fn sweep(&self) -> HeartbeatSweep {
        self.sweep_at(Instant::now())
    }

    /// Runs one heartbeat sweep as of `now`.
    pub fn sweep_at(&self, now: Instant) -> HeartbeatSweep {
        let stale_after = self.config.stale_timeout();
        let timestamp = now_millis();
        let mut sweep = HeartbeatSweep::default();

        for handle in self.pool.all_connections() {
            let idle = now.saturating_duration_since(handle.last_activity());
            if idle > stale_after || handle.is_transport_closed() {
                if self.terminate(handle.id) {
                    warn!(conn_id = %handle.id, idle = ?idle, "Evicted stale connection");
                    self.metrics.connection_evicted();
                    sweep.evicted += 1;
                }
            } else if self.deliver(&handle, OutboundMessage::Heartbeat { timestamp }) {
                sweep.pinged += 1;
            }
        }

        sweep
    }

    /// Processes one inbound text frame from a peer.
    pub async fn handle_inbound(&self, conn_id: ConnectionId, raw: &str) {
        let Some(handle) = self.pool.get(&conn_id) else {
            warn!(conn_id = %conn_id, "Message from unknown connection");
            return;
        };
        if !handle.is_open() {
            return;
        }

        handle.touch();
        self.metrics.message_received();

        if let Err(e) = validate_inbound(raw, self.config.max_message_bytes) {
            self.deliver(&handle, OutboundMessage::error(ErrorFrame::from(&e)));
            return;
        }

        let msg: InboundMessage = match serde_json::from_str(raw) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "Malformed inbound frame");
                self.deliver(
                    &handle,
                    OutboundMessage::error(ErrorFrame::new(
                        ErrorCode::InvalidInput,
                        format!("Malformed message: {e}"),
                    )),
                );
                return;
            }
        };

        match msg {
            InboundMessage::Authenticate { token } => {
                // Outcome already reported to the peer.
                let _ = self.authenticate(conn_id, &token).await;
            }
            InboundMessage::Subscribe {
                entity_type,
                entity_id,
                filter,
                event_kind,
            } => {
                let response =
                    match self.subscribe_from_wire(&handle, &entity_type, entity_id, filter, event_kind) {
                        Ok(subscription) => OutboundMessage::SubscriptionResponse {
                            success: true,
                            subscription: Some(subscription.info()),
                            error: None,
                        },
                        Err(e) => {
                            debug!(conn_id = %conn_id, error = %e, "Subscribe rejected");
                            OutboundMessage::SubscriptionResponse {
                                success: false,
                                subscription: None,
                                error: Some(ErrorFrame::from(&e)),
                            }
                        }
                    };
                self.deliver(&handle, response);
            }
            InboundMessage::Unsubscribe {
                entity_type,
                entity_id,
                all,
            } => {
                let response = if all {
                    self.subscriptions.unsubscribe_all(conn_id);
                    OutboundMessage::UnsubscriptionResponse { success: true }
                } else {
                    match topic_from_wire(entity_type.as_deref(), entity_id.as_ref()) {
                        Ok(topic) => OutboundMessage::UnsubscriptionResponse {
                            success: self.subscriptions.unsubscribe_topic(conn_id, &topic),
                        },
                        Err(e) => OutboundMessage::error(ErrorFrame::from(&e)),
                    }
                };
                self.deliver(&handle, response);
            }
            InboundMessage::Ping => {
                self.deliver(
                    &handle,
                    OutboundMessage::Pong {
                        timestamp: now_millis(),
                    },
                );
            }
            InboundMessage::Pong { .. } => {}
        }
    }

    fn subscribe_from_wire(
        &self,
        handle: &ConnectionHandle,
        entity_type: &str,
        entity_id: Option<EntityId>,
        filter: Option<BTreeMap<String, serde_json::Value>>,
        event_kind: Option<KindFilter>,
    ) -> AppResult<Arc<Subscription>> {
        let entity_type: EntityType = entity_type.parse()?;
        let request = SubscribeRequest {
            entity_type,
            entity_id,
            filter: filter.as_ref().and_then(FilterExpr::from_equality_map),
            event_kind: event_kind.and_then(KindFilter::as_kind),
        };
        self.subscribe(handle, request)
    }

    /// Subscribes a connection on behalf of the server.
    pub fn subscribe_connection(
        &self,
        conn_id: ConnectionId,
        request: SubscribeRequest,
    ) -> AppResult<Arc<Subscription>> {
        let handle = self
            .pool
            .get(&conn_id)
            .ok_or_else(|| AppError::not_found("Unknown connection"))?;
        self.subscribe(&handle, request)
    }

    fn subscribe(
        &self,
        handle: &ConnectionHandle,
        request: SubscribeRequest,
    ) -> AppResult<Arc<Subscription>> {
        if !handle.is_open() {
            return Err(AppError::transport("Connection is closing"));
        }
        let subscriber = Subscriber {
            connection_id: handle.id,
            authenticated: handle.is_authenticated(),
        };
        let subscription = self.subscriptions.subscribe(subscriber, request)?;

        // Terminate may have purged this connection between the check above
        // and the insert.
        if !handle.is_open() {
            self.subscriptions
                .unsubscribe_topic(handle.id, &subscription.topic);
            return Err(AppError::transport("Connection is closing"));
        }
        Ok(subscription)
    }

    /// Gets a connection handle.
    pub fn get(&self, conn_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.pool.get(&conn_id)
    }

    /// Whether the connection exists and has authenticated.
    pub fn is_authenticated(&self, conn_id: ConnectionId) -> bool {
        self.pool
            .get(&conn_id)
            .is_some_and(|handle| handle.is_authenticated())
    }

    /// Returns the live connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Returns the number of distinct authenticated subjects.
    pub fn subject_count(&self) -> usize {
        self.pool.subject_count()
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }
}

fn topic_from_wire(entity_type: Option<&str>, entity_id: Option<&EntityId>) -> AppResult<TopicKey> {
    let entity_type: EntityType = entity_type
        .ok_or_else(|| AppError::validation("entityType is required"))?
        .parse()?;
    Ok(TopicKey::new(entity_type, entity_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::test_support::{drain, fixture};

    #[tokio::test]
    async fn test_authenticate_failure_keeps_connection_open() {
        let fx = fixture();
        let mut conn = fx.registry.accept();

        fx.registry
            .handle_inbound(conn.id, r#"{"type":"authenticate","token":"nope"}"#)
            .await;

        assert_eq!(
            drain(&mut conn),
            vec![OutboundMessage::AuthResponse {
                success: false,
                message: "Authentication failed".to_string()
            }]
        );
        assert!(!fx.registry.is_authenticated(conn.id));
        assert!(fx.registry.get(conn.id).unwrap().is_open());
        assert!(!conn.closed.is_cancelled());
    }

    #[tokio::test]
    async fn test_authenticate_then_subscribe() {
        let fx = fixture();
        let mut conn = fx.registry.accept();

        fx.registry
            .handle_inbound(
                conn.id,
                r#"{"type":"subscribe","entityType":"orders","entityId":42}"#,
            )
            .await;
        match drain(&mut conn).as_slice() {
            [OutboundMessage::SubscriptionResponse { success: false, error: Some(err), .. }] => {
                assert_eq!(err.code, ErrorCode::Unauthorized);
            }
            other => panic!("unexpected frames: {other:?}"),
        }

        fx.registry.authenticate(conn.id, "good-u1").await.unwrap();
        fx.registry
            .handle_inbound(
                conn.id,
                r#"{"type":"subscribe","entityType":"orders","entityId":42}"#,
            )
            .await;

        let frames = drain(&mut conn);
        assert!(matches!(frames[0], OutboundMessage::AuthResponse { success: true, .. }));
        match &frames[1] {
            OutboundMessage::SubscriptionResponse {
                success: true,
                subscription: Some(info),
                ..
            } => assert_eq!(info.topic, "orders:42"),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(fx.subscriptions.subscription_count(conn.id), 1);
    }

    #[tokio::test]
    async fn test_unknown_entity_type_and_bad_json() {
        let fx = fixture();
        let mut conn = fx.registry.accept();
        fx.registry.authenticate(conn.id, "good-u1").await.unwrap();
        drain(&mut conn);

        fx.registry
            .handle_inbound(conn.id, r#"{"type":"subscribe","entityType":"spaceships"}"#)
            .await;
        fx.registry.handle_inbound(conn.id, "{not json").await;
        fx.registry.handle_inbound(conn.id, "   ").await;

        let frames = drain(&mut conn);
        assert_eq!(frames.len(), 3);
        match &frames[0] {
            OutboundMessage::SubscriptionResponse { error: Some(err), .. } => {
                assert_eq!(err.code, ErrorCode::InvalidInput);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        for frame in &frames[1..] {
            assert!(matches!(
                frame,
                OutboundMessage::Error {
                    code: ErrorCode::InvalidInput,
                    ..
                }
            ));
        }
        assert!(fx.registry.get(conn.id).unwrap().is_open());
    }

    #[tokio::test]
    async fn test_ping_and_unsubscribe() {
        let fx = fixture();
        let mut conn = fx.registry.accept();
        fx.registry.authenticate(conn.id, "good-u1").await.unwrap();
        fx.registry
            .subscribe_connection(
                conn.id,
                SubscribeRequest::entity_type(EntityType::Product).with_id(EntityId::from(3)),
            )
            .unwrap();
        drain(&mut conn);

        fx.registry.handle_inbound(conn.id, r#"{"type":"ping"}"#).await;
        fx.registry
            .handle_inbound(
                conn.id,
                r#"{"type":"unsubscribe","entityType":"products","entityId":"3"}"#,
            )
            .await;
        fx.registry
            .handle_inbound(conn.id, r#"{"type":"unsubscribe","entityType":"products","entityId":"3"}"#)
            .await;

        let frames = drain(&mut conn);
        assert!(matches!(frames[0], OutboundMessage::Pong { .. }));
        assert_eq!(frames[1], OutboundMessage::UnsubscriptionResponse { success: true });
        assert_eq!(frames[2], OutboundMessage::UnsubscriptionResponse { success: false });
    }

    #[tokio::test]
    async fn test_terminate_purges_subscriptions_and_is_idempotent() {
        let fx = fixture();
        let conn = fx.registry.accept();
        let other = fx.registry.accept();
        fx.registry.authenticate(conn.id, "good-u1").await.unwrap();
        fx.registry.authenticate(other.id, "good-u2").await.unwrap();

        for id in [1u64, 2, 3] {
            fx.registry
                .subscribe_connection(
                    conn.id,
                    SubscribeRequest::entity_type(EntityType::Order).with_id(EntityId::from(id)),
                )
                .unwrap();
        }
        fx.registry
            .subscribe_connection(other.id, SubscribeRequest::entity_type(EntityType::Order))
            .unwrap();

        assert!(fx.registry.terminate(conn.id));
        assert!(!fx.registry.terminate(conn.id));
        assert!(conn.closed.is_cancelled());
        assert!(fx.registry.get(conn.id).is_none());

        for id in [1u64, 2, 3] {
            let subscribers = fx
                .subscriptions
                .subscribers_of(EntityType::Order, Some(&EntityId::from(id)));
            assert!(!subscribers.contains(&conn.id));
            assert!(subscribers.contains(&other.id));
        }
        fx.subscriptions.verify_consistency().unwrap();

        assert!(!fx.registry.send(conn.id, OutboundMessage::Heartbeat { timestamp: 0 }));
        assert!(!other.closed.is_cancelled());
    }

    #[tokio::test]
    async fn test_terminate_subject_closes_all_of_its_connections() {
        let fx = fixture();
        let a = fx.registry.accept();
        let b = fx.registry.accept();
        let c = fx.registry.accept();
        fx.registry.authenticate(a.id, "good-u1").await.unwrap();
        fx.registry.authenticate(b.id, "good-u1").await.unwrap();
        fx.registry.authenticate(c.id, "good-u2").await.unwrap();

        assert_eq!(fx.registry.terminate_subject("u1"), 2);
        assert!(a.closed.is_cancelled());
        assert!(b.closed.is_cancelled());
        assert!(!c.closed.is_cancelled());
        assert_eq!(fx.registry.connection_count(), 1);
        assert_eq!(fx.registry.subject_count(), 1);
    }

    #[tokio::test]
    async fn test_send_to_dead_peer_returns_false() {
        let fx = fixture();
        let conn = fx.registry.accept();
        let id = conn.id;
        drop(conn);

        assert!(!fx.registry.send(id, OutboundMessage::Heartbeat { timestamp: 0 }));
        assert!(!fx.registry.send(ConnectionId::new(), OutboundMessage::Heartbeat { timestamp: 0 }));
    }

    #[tokio::test]
    async fn test_broadcast_counts_accepted_frames() {
        let fx = fixture();
        let a = fx.registry.accept();
        let b = fx.registry.accept();
        let gone = fx.registry.accept();
        let gone_id = gone.id;
        drop(gone);

        let sent = fx.registry.broadcast(
            [a.id, b.id, gone_id, ConnectionId::new()],
            &OutboundMessage::Heartbeat { timestamp: 0 },
        );
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn test_heartbeat_evicts_stale_and_keeps_active() {
        let fx = fixture();
        let mut stale = fx.registry.accept();
        let mut active = fx.registry.accept();
        fx.registry.authenticate(stale.id, "good-u1").await.unwrap();
        fx.registry
            .subscribe_connection(stale.id, SubscribeRequest::entity_type(EntityType::Order))
            .unwrap();
        drain(&mut stale);
        drain(&mut active);

        let stale_timeout = fx.registry.config().stale_timeout();
        let start = Instant::now();
        let later = start + stale_timeout + Duration::from_secs(10);
        fx.registry
            .get(active.id)
            .unwrap()
            .touch_at(later - Duration::from_secs(5));

        let sweep = fx.registry.sweep_at(later);
        assert_eq!(sweep, HeartbeatSweep { evicted: 1, pinged: 1 });

        assert!(stale.closed.is_cancelled());
        assert!(fx.registry.get(stale.id).is_none());
        assert!(
            fx.subscriptions
                .subscribers_of(EntityType::Order, None)
                .is_empty()
        );

        assert!(!active.closed.is_cancelled());
        assert!(matches!(
            drain(&mut active).as_slice(),
            [OutboundMessage::Heartbeat { .. }]
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_evicts_disconnected_transport() {
        let fx = fixture();
        drop(fx.registry.accept());

        let sweep = fx.registry.sweep();
        assert_eq!(sweep.evicted, 1);
        assert_eq!(fx.registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_after_terminate_is_rejected() {
        let fx = fixture();
        let conn = fx.registry.accept();
        fx.registry.authenticate(conn.id, "good-u1").await.unwrap();
        let handle = fx.registry.get(conn.id).unwrap();
        fx.registry.terminate(conn.id);

        assert!(
            fx.registry
                .subscribe(&handle, SubscribeRequest::entity_type(EntityType::Order))
                .is_err()
        );
        assert_eq!(fx.subscriptions.topic_count(), 0);
    }
}
