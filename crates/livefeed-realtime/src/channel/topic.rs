//! Topic keys: `type` for type-wide topics, `type:id` for a single entity.

use std::fmt;

use livefeed_core::types::{EntityId, EntityType};

/// Fan-out channel name derived from an entity type and optional id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicKey(String);

impl TopicKey {
    /// Builds the key for `entity_type`, narrowed to `entity_id` when given.
    pub fn new(entity_type: EntityType, entity_id: Option<&EntityId>) -> Self {
        match entity_id {
            Some(id) => Self(format!("{}:{}", entity_type.as_str(), id.as_str())),
            None => Self::type_wide(entity_type),
        }
    }

    /// Key covering every instance of `entity_type`.
    pub fn type_wide(entity_type: EntityType) -> Self {
        Self(entity_type.as_str().to_string())
    }

    /// The topic string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key names a single entity rather than a whole type.
    pub fn is_entity_specific(&self) -> bool {
        self.0.contains(':')
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
