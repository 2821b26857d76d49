//! WebSocket wire protocol shared by the server engine and the client.
//!
//! Every frame is a JSON object tagged by `type`; field names are camelCase.

pub mod codes;
pub mod messages;

pub use codes::{ErrorCode, ErrorFrame};
pub use messages::{InboundMessage, KindFilter, OutboundMessage, SubscriptionInfo};

use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn wire_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Current wire timestamp.
pub fn now_millis() -> i64 {
    wire_timestamp(Utc::now())
}
