//! Subscription records and the requests that create them.

use chrono::{DateTime, Utc};

use livefeed_core::events::{ChangeEvent, EventKind};
use livefeed_core::protocol::{KindFilter, SubscriptionInfo};
use livefeed_core::types::{ConnectionId, EntityId, EntityType, SubscriptionId};

use super::filter::{FilterError, FilterExpr};
use super::topic::TopicKey;

/// What a connection asks to observe.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    /// Entity type.
    pub entity_type: EntityType,
    /// Single instance, or every instance when `None`.
    pub entity_id: Option<EntityId>,
    /// Payload predicate.
    pub filter: Option<FilterExpr>,
    /// Event-kind restriction.
    pub event_kind: Option<EventKind>,
}

impl SubscribeRequest {
    /// Type-wide request with no filters.
    pub fn entity_type(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entity_id: None,
            filter: None,
            event_kind: None,
        }
    }

    /// Narrows the request to one entity.
    pub fn with_id(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Adds a payload filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Restricts to one event kind.
    pub fn with_event_kind(mut self, kind: EventKind) -> Self {
        self.event_kind = Some(kind);
        self
    }

    /// Topic this request subscribes to.
    pub fn topic(&self) -> TopicKey {
        TopicKey::new(self.entity_type, self.entity_id.as_ref())
    }
}

/// One accepted subscription, owned by a single connection.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Owning connection.
    pub connection_id: ConnectionId,
    /// Topic key.
    pub topic: TopicKey,
    /// Entity type.
    pub entity_type: EntityType,
    /// Instance id for entity-specific subscriptions.
    pub entity_id: Option<EntityId>,
    /// Event-kind restriction.
    pub event_kind: Option<EventKind>,
    /// Payload predicate.
    pub filter: Option<FilterExpr>,
    /// When the subscription was accepted.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Creates a record for `connection_id` from a request.
    pub fn new(connection_id: ConnectionId, request: SubscribeRequest) -> Self {
        Self {
            id: SubscriptionId::new(),
            connection_id,
            topic: request.topic(),
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            event_kind: request.event_kind,
            filter: request.filter,
            created_at: Utc::now(),
        }
    }

    /// Checks the event against type, id, kind, then payload filter,
    /// stopping at the first mismatch.
    pub fn matches(&self, event: &ChangeEvent) -> Result<bool, FilterError> {
        if self.entity_type != event.entity_type {
            return Ok(false);
        }
        if let Some(id) = &self.entity_id {
            if *id != event.entity_id {
                return Ok(false);
            }
        }
        if let Some(kind) = self.event_kind {
            if kind != event.event_kind {
                return Ok(false);
            }
        }
        match &self.filter {
            Some(filter) => filter.evaluate(&event.data),
            None => Ok(true),
        }
    }

    /// Public view sent back to the subscriber.
    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            topic: self.topic.to_string(),
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
            event_kind: KindFilter::from(self.event_kind),
            filter: self.filter.as_ref().and_then(FilterExpr::as_equality_map),
        }
    }
}
