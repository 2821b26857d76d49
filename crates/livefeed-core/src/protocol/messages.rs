//! Inbound and outbound WebSocket message type definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::{ChangeEvent, EventKind};
use crate::types::{EntityId, EntityType, SubscriptionId};

use super::codes::{ErrorCode, ErrorFrame};

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    /// Present an access token.
    Authenticate {
        /// Signed access token.
        token: String,
    },
    /// Subscribe to a type-wide or entity-specific topic.
    Subscribe {
        /// Entity type name; validated against the allow-list by the server.
        entity_type: String,
        /// Optional instance id; absent means every instance of the type.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<EntityId>,
        /// Optional field-equality filter over the event payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<BTreeMap<String, serde_json::Value>>,
        /// Optional event-kind restriction.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_kind: Option<KindFilter>,
    },
    /// Remove one subscription, or all of them with `all: true`.
    Unsubscribe {
        /// Entity type name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_type: Option<String>,
        /// Optional instance id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<EntityId>,
        /// Drop every subscription held by this connection.
        #[serde(default)]
        all: bool,
    },
    /// Client keepalive; answered with `pong`.
    Ping,
    /// Reply to a server keepalive.
    Pong {
        /// Echoed timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

/// Event-kind restriction requested by a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFilter {
    /// Only `created` events.
    Created,
    /// Only `updated` events.
    Updated,
    /// Only `deleted` events.
    Deleted,
    /// Every event kind.
    Any,
}

impl KindFilter {
    /// Returns the single kind selected, or `None` for [`KindFilter::Any`].
    pub fn as_kind(self) -> Option<EventKind> {
        match self {
            Self::Created => Some(EventKind::Created),
            Self::Updated => Some(EventKind::Updated),
            Self::Deleted => Some(EventKind::Deleted),
            Self::Any => None,
        }
    }
}

impl From<Option<EventKind>> for KindFilter {
    fn from(kind: Option<EventKind>) -> Self {
        match kind {
            Some(EventKind::Created) => Self::Created,
            Some(EventKind::Updated) => Self::Updated,
            Some(EventKind::Deleted) => Self::Deleted,
            None => Self::Any,
        }
    }
}

/// Public view of an accepted subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Topic key (`type` or `type:id`).
    pub topic: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Instance id for entity-specific subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Event-kind restriction.
    pub event_kind: KindFilter,
    /// Field-equality filter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<BTreeMap<String, serde_json::Value>>,
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Result of an `authenticate` request.
    AuthResponse {
        /// Whether the connection is now authenticated.
        success: bool,
        /// Human-readable outcome.
        message: String,
    },
    /// Result of a `subscribe` request.
    SubscriptionResponse {
        /// Whether the subscription was accepted.
        success: bool,
        /// The accepted subscription.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription: Option<SubscriptionInfo>,
        /// Why the subscription was rejected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorFrame>,
    },
    /// Result of an `unsubscribe` request.
    UnsubscriptionResponse {
        /// Whether anything was removed.
        success: bool,
    },
    /// Reply to a client `ping`.
    Pong {
        /// Server timestamp (ms).
        timestamp: i64,
    },
    /// Server keepalive; needs no reply.
    Heartbeat {
        /// Server timestamp (ms).
        timestamp: i64,
    },
    /// Fan-out of a change event.
    Event {
        /// Entity type.
        entity_type: EntityType,
        /// Entity id.
        entity_id: EntityId,
        /// Mutation kind.
        event_kind: EventKind,
        /// Payload.
        data: serde_json::Value,
        /// When the change happened (ms).
        timestamp: i64,
    },
    /// Error not tied to a specific response type.
    Error {
        /// Stable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
}

impl OutboundMessage {
    /// Builds the fan-out frame for a change event.
    pub fn event(event: &ChangeEvent) -> Self {
        Self::Event {
            entity_type: event.entity_type,
            entity_id: event.entity_id.clone(),
            event_kind: event.event_kind,
            data: event.data.clone(),
            timestamp: super::wire_timestamp(event.occurred_at),
        }
    }

    /// Builds an error frame.
    pub fn error(frame: ErrorFrame) -> Self {
        Self::Error {
            code: frame.code,
            message: frame.message,
        }
    }
}
