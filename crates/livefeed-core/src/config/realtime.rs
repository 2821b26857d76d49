//! Real-time WebSocket engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Interval between heartbeat sweeps in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Inactivity after which a connection is evicted, in seconds.
    #[serde(default = "default_stale_timeout")]
    pub stale_timeout_seconds: u64,
    /// Whether subscribing requires an authenticated connection.
    #[serde(default = "default_true")]
    pub require_auth_for_subscribe: bool,
    /// Per-connection outbound buffer size (frames).
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Maximum topic subscriptions per connection.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_connection: usize,
    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Capacity of the change-feed queue between store writers and the dispatcher.
    #[serde(default = "default_change_feed_capacity")]
    pub change_feed_capacity: usize,
    /// A socket write that takes longer than this drops the connection.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,
}

impl RealtimeConfig {
    /// Heartbeat sweep interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Stale-connection threshold.
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_seconds)
    }

    /// Bound on a single socket write.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            stale_timeout_seconds: default_stale_timeout(),
            require_auth_for_subscribe: true,
            channel_buffer_size: default_channel_buffer(),
            max_subscriptions_per_connection: default_max_subscriptions(),
            max_message_bytes: default_max_message_bytes(),
            change_feed_capacity: default_change_feed_capacity(),
            send_timeout_seconds: default_send_timeout(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_stale_timeout() -> u64 {
    90
}

fn default_true() -> bool {
    true
}

fn default_channel_buffer() -> usize {
    256
}

fn default_max_subscriptions() -> usize {
    50
}

fn default_max_message_bytes() -> usize {
    65_536
}

fn default_change_feed_capacity() -> usize {
    1024
}

fn default_send_timeout() -> u64 {
    10
}
