//! Core type definitions used across the LiveFeed workspace.

pub mod entity;
pub mod id;
pub mod subject;

pub use entity::{EntityId, EntityType};
pub use id::*;
pub use subject::{Role, Subject};
