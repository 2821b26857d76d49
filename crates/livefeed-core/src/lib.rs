//! # livefeed-core
//!
//! Core crate for LiveFeed. Contains configuration schemas, typed
//! identifiers, the entity-type allow-list, change events, the WebSocket
//! wire protocol, and the unified error system.
//!
//! This crate has **no** internal dependencies on other LiveFeed crates.

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
