//! Capabilities the connection registry delegates to.
//!
//! The registry is constructed with trait objects for authentication and
//! subscription bookkeeping so it never reaches for global state and can be
//! driven by test doubles.

use std::sync::Arc;

use async_trait::async_trait;

use livefeed_core::result::AppResult;
use livefeed_core::types::{ConnectionId, Subject};

use crate::channel::subscription::{SubscribeRequest, Subscription};
use crate::channel::topic::TopicKey;

/// Verifies a bearer token presented over a connection.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Returns the subject the token speaks for.
    ///
    /// Errors must be of kind `Authentication` and carry no detail beyond
    /// a generic classification.
    async fn authenticate(&self, token: &str) -> AppResult<Subject>;
}

/// The connection-side facts a subscription decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    /// Connection asking to subscribe.
    pub connection_id: ConnectionId,
    /// Whether that connection has authenticated.
    pub authenticated: bool,
}

/// Topic subscription bookkeeping.
pub trait SubscriptionHandler: Send + Sync {
    /// Records a subscription, replacing any existing one for the same
    /// connection and topic.
    fn subscribe(
        &self,
        subscriber: Subscriber,
        request: SubscribeRequest,
    ) -> AppResult<Arc<Subscription>>;

    /// Removes the connection's subscription to `topic`.
    fn unsubscribe_topic(&self, connection_id: ConnectionId, topic: &TopicKey) -> bool;

    /// Removes every subscription held by the connection.
    fn unsubscribe_all(&self, connection_id: ConnectionId) -> usize;
}
