//! # livefeed-client
//!
//! Resilient WebSocket client for LiveFeed. Reconnects with capped
//! exponential backoff, queues outgoing frames while disconnected,
//! re-authenticates and replays subscriptions after a reconnect, and keeps
//! the socket alive with periodic pings.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod queue;
pub mod subscription;

pub use backoff::ReconnectPolicy;
pub use client::{ClientState, LiveFeedClient};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use queue::{OutboundQueue, OverflowPolicy};
pub use subscription::Topic;
