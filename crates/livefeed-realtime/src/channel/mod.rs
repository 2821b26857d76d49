//! Topic subscriptions: keys, filters, records, and the registry.

pub mod filter;
pub mod registry;
pub mod subscription;
pub mod topic;

pub use filter::{FilterError, FilterExpr};
pub use registry::{ConsistencyError, SubscriptionRegistry};
pub use subscription::{SubscribeRequest, Subscription};
pub use topic::TopicKey;
