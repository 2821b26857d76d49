//! Subscriptions remembered by the client for replay after reconnect.

use std::collections::BTreeMap;

use serde_json::Value;

use livefeed_core::events::EventKind;
use livefeed_core::protocol::{InboundMessage, KindFilter};
use livefeed_core::types::{EntityId, EntityType};

/// A subscription the client keeps alive across reconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub entity_type: EntityType,
    pub entity_id: Option<EntityId>,
    pub filter: Option<BTreeMap<String, Value>>,
    pub event_kind: Option<EventKind>,
}

impl Topic {
    /// Every entity of a type.
    pub fn entity_type(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entity_id: None,
            filter: None,
            event_kind: None,
        }
    }

    /// A single entity.
    pub fn entity(entity_type: EntityType, entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Self::entity_type(entity_type)
        }
    }

    /// Adds a field-equality condition.
    pub fn with_field(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter
            .get_or_insert_with(BTreeMap::new)
            .insert(path.into(), value.into());
        self
    }

    pub fn with_event_kind(mut self, kind: EventKind) -> Self {
        self.event_kind = Some(kind);
        self
    }

    /// Topic key, `type` or `type:id`. One subscription per key.
    pub fn key(&self) -> String {
        match &self.entity_id {
            Some(id) => format!("{}:{}", self.entity_type.as_str(), id.as_str()),
            None => self.entity_type.as_str().to_string(),
        }
    }

    pub(crate) fn subscribe_message(&self) -> InboundMessage {
        InboundMessage::Subscribe {
            entity_type: self.entity_type.as_str().to_string(),
            entity_id: self.entity_id.clone(),
            filter: self.filter.clone(),
            event_kind: self.event_kind.map(|kind| KindFilter::from(Some(kind))),
        }
    }

    pub(crate) fn unsubscribe_message(&self) -> InboundMessage {
        InboundMessage::Unsubscribe {
            entity_type: Some(self.entity_type.as_str().to_string()),
            entity_id: self.entity_id.clone(),
            all: false,
        }
    }
}
