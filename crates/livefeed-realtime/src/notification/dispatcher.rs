//! Event dispatcher: matches change events against subscriptions and fans
//! them out.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use livefeed_core::events::ChangeEvent;
use livefeed_core::protocol::OutboundMessage;
use livefeed_core::types::ConnectionId;

use crate::channel::registry::SubscriptionRegistry;
use crate::connection::registry::ConnectionRegistry;
use crate::metrics::RealtimeMetrics;

/// Fans change events out to matching connections.
#[derive(Debug)]
pub struct EventDispatcher {
    /// Subscription registry to match against
    subscriptions: Arc<SubscriptionRegistry>,
    /// Connection registry for sending frames
    connections: Arc<ConnectionRegistry>,
    /// Metrics
    metrics: Arc<RealtimeMetrics>,
}

impl EventDispatcher {
    /// Create a new dispatcher
    pub fn new(
        subscriptions: Arc<SubscriptionRegistry>,
        connections: Arc<ConnectionRegistry>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            subscriptions,
            connections,
            metrics,
        }
    }

    /// Dispatch an event to every connection with a matching subscription.
    ///
    /// A connection matching through several subscriptions receives a single
    /// frame. A subscription whose filter fails is skipped and logged; it
    /// never affects the others. Returns the matched connections.
    pub fn dispatch(&self, event: &ChangeEvent) -> HashSet<ConnectionId> {
        let candidates = self.subscriptions.candidates(event);
        let mut matched = HashSet::new();

        for subscription in &candidates {
            if matched.contains(&subscription.connection_id) {
                continue;
            }
            match subscription.matches(event) {
                Ok(true) => {
                    matched.insert(subscription.connection_id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        conn_id = %subscription.connection_id,
                        subscription_id = %subscription.id,
                        topic = %subscription.topic,
                        error = %e,
                        "Subscription filter failed, skipping"
                    );
                    self.metrics.predicate_failed();
                }
            }
        }

        let frame = OutboundMessage::event(event);
        let delivered = self.connections.broadcast(matched.iter().copied(), &frame);
        self.metrics.event_dispatched(delivered);

        debug!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            event_kind = %event.event_kind,
            candidates = candidates.len(),
            matched = matched.len(),
            delivered,
            "Dispatched change event"
        );

        matched
    }
}
