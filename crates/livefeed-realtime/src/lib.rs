//! # livefeed-realtime
//!
//! Real-time WebSocket engine for LiveFeed. Provides:
//!
//! - Connection registry with token authentication and heartbeat eviction
//! - Topic subscriptions with optional field filters
//! - Change-event fan-out to matching connections
//! - A bounded change feed between store writers and the dispatcher

pub mod bridge;
pub mod channel;
pub mod connection;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod notification;
pub mod server;

#[cfg(test)]
mod test_support;

pub use bridge::ChangeFeed;
pub use channel::{FilterExpr, SubscribeRequest, SubscriptionRegistry, TopicKey};
pub use connection::{AcceptedConnection, ConnectionRegistry};
pub use handler::{AuthHandler, SubscriptionHandler};
pub use metrics::{MetricsSnapshot, RealtimeMetrics};
pub use notification::EventDispatcher;
pub use server::{EngineStatus, RealtimeEngine};
