//! Client connection options.

use std::time::Duration;

use crate::backoff::ReconnectPolicy;
use crate::queue::OverflowPolicy;

/// Options for [`LiveFeedClient`](crate::LiveFeedClient).
///
/// ```ignore
/// let config = ClientConfig::new("ws://127.0.0.1:8080/ws")
///     .with_keepalive(Duration::from_secs(20))
///     .with_stale_timeout(Duration::from_secs(90));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
    /// Interval between client pings while open.
    pub keepalive_interval: Duration,
    /// Silence after which the client reconnects pre-emptively. Should match
    /// the server's stale threshold.
    pub stale_timeout: Duration,
    /// Time allowed for the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Frames held while disconnected.
    pub queue_capacity: usize,
    /// Behaviour when the queue is full.
    pub overflow: OverflowPolicy,
    /// Server frames buffered for the caller.
    pub event_buffer: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            keepalive_interval: Duration::from_secs(25),
            stale_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            queue_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
            event_buffer: 256,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_queue(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.queue_capacity = capacity;
        self.overflow = overflow;
        self
    }

    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size.max(1);
        self
    }
}
