//! Change events emitted by the surrounding system after a store write.
//!
//! A [`ChangeEvent`] is an immutable value describing one mutation of one
//! entity. The real-time engine never persists it; each event is consumed by
//! a single dispatch call.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntityId, EntityType};

/// Kind of mutation that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The entity was inserted.
    Created,
    /// One or more fields of the entity changed.
    Updated,
    /// The entity was removed.
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Normalized description of a create/update/delete on a backing entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Entity type that changed.
    pub entity_type: EntityType,
    /// Instance that changed.
    pub entity_id: EntityId,
    /// Kind of mutation.
    pub event_kind: EventKind,
    /// Changed fields or the full row.
    pub data: serde_json::Value,
    /// When the mutation was observed.
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates a change event stamped with the current time.
    pub fn new(
        entity_type: EntityType,
        entity_id: EntityId,
        event_kind: EventKind,
        data: serde_json::Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            event_kind,
            data,
            occurred_at: Utc::now(),
        }
    }

    /// Shorthand for a `created` event.
    pub fn created(entity_type: EntityType, entity_id: EntityId, data: serde_json::Value) -> Self {
        Self::new(entity_type, entity_id, EventKind::Created, data)
    }

    /// Shorthand for an `updated` event.
    pub fn updated(entity_type: EntityType, entity_id: EntityId, data: serde_json::Value) -> Self {
        Self::new(entity_type, entity_id, EventKind::Updated, data)
    }

    /// Shorthand for a `deleted` event.
    pub fn deleted(entity_type: EntityType, entity_id: EntityId, data: serde_json::Value) -> Self {
        Self::new(entity_type, entity_id, EventKind::Deleted, data)
    }
}
