//! Subscription registry: topic → connections and connection → topics.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, error};

use livefeed_core::config::RealtimeConfig;
use livefeed_core::error::AppError;
use livefeed_core::events::ChangeEvent;
use livefeed_core::result::AppResult;
use livefeed_core::types::{ConnectionId, EntityId, EntityType};

use crate::handler::{Subscriber, SubscriptionHandler};

use super::subscription::{SubscribeRequest, Subscription};
use super::topic::TopicKey;

/// A broken link between the forward and reverse indexes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// Forward index holds a pair the reverse index lacks.
    #[error("topic '{topic}' lists connection {connection_id} but the reverse index does not")]
    MissingReverse {
        /// Topic key.
        topic: String,
        /// Connection id.
        connection_id: ConnectionId,
    },
    /// Reverse index holds a pair the forward index lacks.
    #[error("connection {connection_id} lists topic '{topic}' but the forward index does not")]
    MissingForward {
        /// Topic key.
        topic: String,
        /// Connection id.
        connection_id: ConnectionId,
    },
    /// A record is filed under a key that does not describe it.
    #[error("subscription for connection {connection_id} is filed under topic '{topic}'")]
    Misfiled {
        /// Topic key the record was found under.
        topic: String,
        /// Connection id the record was found under.
        connection_id: ConnectionId,
    },
    /// An empty set was left behind.
    #[error("empty index entry left for '{0}'")]
    EmptyEntry(String),
}

/// Both directions of the index, always mutated together.
#[derive(Debug, Default)]
struct SubscriptionIndex {
    /// Topic → subscribing connection → record.
    forward: HashMap<TopicKey, HashMap<ConnectionId, Arc<Subscription>>>,
    /// Connection → topics it subscribes to.
    reverse: HashMap<ConnectionId, HashSet<TopicKey>>,
}

impl SubscriptionIndex {
    fn insert(&mut self, subscription: Arc<Subscription>) -> Option<Arc<Subscription>> {
        let topic = subscription.topic.clone();
        let connection_id = subscription.connection_id;
        self.reverse
            .entry(connection_id)
            .or_default()
            .insert(topic.clone());
        self.forward
            .entry(topic)
            .or_default()
            .insert(connection_id, subscription)
    }

    fn remove(&mut self, connection_id: ConnectionId, topic: &TopicKey) -> Option<Arc<Subscription>> {
        let removed = self.forward.get_mut(topic)?.remove(&connection_id)?;
        if self.forward.get(topic).is_some_and(HashMap::is_empty) {
            self.forward.remove(topic);
        }
        if let Some(topics) = self.reverse.get_mut(&connection_id) {
            topics.remove(topic);
            if topics.is_empty() {
                self.reverse.remove(&connection_id);
            }
        }
        Some(removed)
    }

    fn remove_connection(&mut self, connection_id: ConnectionId) -> usize {
        let Some(topics) = self.reverse.remove(&connection_id) else {
            return 0;
        };
        let mut removed = 0usize;
        for topic in &topics {
            if let Some(subscribers) = self.forward.get_mut(topic) {
                if subscribers.remove(&connection_id).is_some() {
                    removed += 1;
                }
                if subscribers.is_empty() {
                    self.forward.remove(topic);
                }
            }
        }
        removed
    }

    fn count_for(&self, connection_id: ConnectionId) -> usize {
        self.reverse.get(&connection_id).map_or(0, HashSet::len)
    }

    fn check(&self) -> Result<(), ConsistencyError> {
        for (topic, subscribers) in &self.forward {
            if subscribers.is_empty() {
                return Err(ConsistencyError::EmptyEntry(topic.to_string()));
            }
            for (connection_id, subscription) in subscribers {
                if subscription.topic != *topic || subscription.connection_id != *connection_id {
                    return Err(ConsistencyError::Misfiled {
                        topic: topic.to_string(),
                        connection_id: *connection_id,
                    });
                }
                let listed = self
                    .reverse
                    .get(connection_id)
                    .is_some_and(|topics| topics.contains(topic));
                if !listed {
                    return Err(ConsistencyError::MissingReverse {
                        topic: topic.to_string(),
                        connection_id: *connection_id,
                    });
                }
            }
        }

        for (connection_id, topics) in &self.reverse {
            if topics.is_empty() {
                return Err(ConsistencyError::EmptyEntry(connection_id.to_string()));
            }
            for topic in topics {
                let listed = self
                    .forward
                    .get(topic)
                    .is_some_and(|subscribers| subscribers.contains_key(connection_id));
                if !listed {
                    return Err(ConsistencyError::MissingForward {
                        topic: topic.to_string(),
                        connection_id: *connection_id,
                    });
                }
            }
        }

        Ok(())
    }

    /// Treats the forward index as the source of truth.
    fn rebuild_reverse(&mut self) {
        self.forward.retain(|topic, subscribers| {
            subscribers.retain(|connection_id, subscription| {
                subscription.topic == *topic && subscription.connection_id == *connection_id
            });
            !subscribers.is_empty()
        });

        let mut reverse: HashMap<ConnectionId, HashSet<TopicKey>> = HashMap::new();
        for (topic, subscribers) in &self.forward {
            for connection_id in subscribers.keys() {
                reverse.entry(*connection_id).or_default().insert(topic.clone());
            }
        }
        self.reverse = reverse;
    }
}

/// Registry of all active topic subscriptions.
///
/// Forward and reverse indexes sit behind one lock, so every mutation is
/// applied to both or neither. Dispatch only takes the read lock long enough
/// to clone out candidate records.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    index: RwLock<SubscriptionIndex>,
    /// Reject subscriptions from unauthenticated connections.
    require_auth: bool,
    /// Maximum distinct topics per connection.
    max_per_connection: usize,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            index: RwLock::new(SubscriptionIndex::default()),
            require_auth: config.require_auth_for_subscribe,
            max_per_connection: config.max_subscriptions_per_connection,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SubscriptionIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SubscriptionIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes a connection to a topic.
    ///
    /// Subscribing again to the same topic replaces the earlier record and
    /// yields a new id.
    pub fn subscribe(
        &self,
        subscriber: Subscriber,
        request: SubscribeRequest,
    ) -> AppResult<Arc<Subscription>> {
        if self.require_auth && !subscriber.authenticated {
            return Err(AppError::authorization("Authentication required"));
        }

        let subscription = Arc::new(Subscription::new(subscriber.connection_id, request));

        let mut index = self.write();
        let already_subscribed = index
            .reverse
            .get(&subscriber.connection_id)
            .is_some_and(|topics| topics.contains(&subscription.topic));
        if !already_subscribed && index.count_for(subscriber.connection_id) >= self.max_per_connection {
            return Err(AppError::limit_exceeded(format!(
                "Maximum subscriptions ({}) reached",
                self.max_per_connection
            )));
        }
        index.insert(Arc::clone(&subscription));
        drop(index);

        debug!(
            conn_id = %subscriber.connection_id,
            topic = %subscription.topic,
            subscription_id = %subscription.id,
            replaced = already_subscribed,
            "Subscribed to topic"
        );
        Ok(subscription)
    }

    /// Removes a connection's subscription to one topic.
    pub fn unsubscribe(
        &self,
        connection_id: ConnectionId,
        entity_type: EntityType,
        entity_id: Option<&EntityId>,
    ) -> bool {
        self.unsubscribe_topic(connection_id, &TopicKey::new(entity_type, entity_id))
    }

    /// Removes a connection's subscription to `topic`.
    pub fn unsubscribe_topic(&self, connection_id: ConnectionId, topic: &TopicKey) -> bool {
        let removed = self.write().remove(connection_id, topic).is_some();
        if removed {
            debug!(conn_id = %connection_id, topic = %topic, "Unsubscribed from topic");
        }
        removed
    }

    /// Removes every subscription of a connection.
    pub fn unsubscribe_all(&self, connection_id: ConnectionId) -> usize {
        let removed = self.write().remove_connection(connection_id);
        if removed > 0 {
            debug!(conn_id = %connection_id, removed, "Removed all subscriptions");
        }
        removed
    }

    /// Connections subscribed to the entity's own topic or its type-wide topic.
    pub fn subscribers_of(
        &self,
        entity_type: EntityType,
        entity_id: Option<&EntityId>,
    ) -> HashSet<ConnectionId> {
        let index = self.read();
        let mut result = HashSet::new();

        let type_wide = TopicKey::type_wide(entity_type);
        if let Some(subscribers) = index.forward.get(&type_wide) {
            result.extend(subscribers.keys().copied());
        }
        if entity_id.is_some() {
            let specific = TopicKey::new(entity_type, entity_id);
            if let Some(subscribers) = index.forward.get(&specific) {
                result.extend(subscribers.keys().copied());
            }
        }
        result
    }

    /// Snapshot of every record whose topic covers the event.
    pub fn candidates(&self, event: &ChangeEvent) -> Vec<Arc<Subscription>> {
        let specific = TopicKey::new(event.entity_type, Some(&event.entity_id));
        let type_wide = TopicKey::type_wide(event.entity_type);

        let index = self.read();
        [specific, type_wide]
            .iter()
            .filter_map(|topic| index.forward.get(topic))
            .flat_map(|subscribers| subscribers.values().cloned())
            .collect()
    }

    /// Every subscription held by a connection.
    pub fn subscriptions_of(&self, connection_id: ConnectionId) -> Vec<Arc<Subscription>> {
        let index = self.read();
        index
            .reverse
            .get(&connection_id)
            .into_iter()
            .flatten()
            .filter_map(|topic| index.forward.get(topic)?.get(&connection_id).cloned())
            .collect()
    }

    /// Topic keys a connection is subscribed to.
    pub fn topics_of(&self, connection_id: ConnectionId) -> HashSet<TopicKey> {
        self.read()
            .reverse
            .get(&connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of subscriptions held by a connection.
    pub fn subscription_count(&self, connection_id: ConnectionId) -> usize {
        self.read().count_for(connection_id)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.read().forward.len()
    }

    /// Number of connections holding at least one subscription.
    pub fn connection_count(&self) -> usize {
        self.read().reverse.len()
    }

    /// Checks that the forward and reverse indexes describe the same pairs.
    pub fn verify_consistency(&self) -> Result<(), ConsistencyError> {
        self.read().check()
    }

    /// Verifies the indexes and rebuilds the reverse one from the forward
    /// one if they disagree. Returns whether a repair was needed.
    pub fn ensure_consistent(&self) -> bool {
        let mut index = self.write();
        match index.check() {
            Ok(()) => false,
            Err(violation) => {
                error!(
                    violation = %violation,
                    "Subscription index inconsistent, rebuilding reverse index"
                );
                index.rebuild_reverse();
                true
            }
        }
    }
}

impl SubscriptionHandler for SubscriptionRegistry {
    fn subscribe(
        &self,
        subscriber: Subscriber,
        request: SubscribeRequest,
    ) -> AppResult<Arc<Subscription>> {
        SubscriptionRegistry::subscribe(self, subscriber, request)
    }

    fn unsubscribe_topic(&self, connection_id: ConnectionId, topic: &TopicKey) -> bool {
        SubscriptionRegistry::unsubscribe_topic(self, connection_id, topic)
    }

    fn unsubscribe_all(&self, connection_id: ConnectionId) -> usize {
        SubscriptionRegistry::unsubscribe_all(self, connection_id)
    }
}
