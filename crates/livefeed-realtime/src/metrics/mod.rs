//! Realtime engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    /// Total connections accepted
    connections_total: AtomicU64,
    /// Connections currently registered
    connections_active: AtomicU64,
    /// Connections terminated by the heartbeat sweep
    connections_evicted: AtomicU64,
    /// Frames received from peers
    messages_received: AtomicU64,
    /// Frames queued to peers
    messages_sent: AtomicU64,
    /// Frames dropped because a peer's queue was full or closed
    messages_dropped: AtomicU64,
    /// Change events dispatched
    events_dispatched: AtomicU64,
    /// Event deliveries (one per matched connection)
    events_delivered: AtomicU64,
    /// Filter predicates that failed during evaluation
    predicate_failures: AtomicU64,
}

impl RealtimeMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted connection
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminated connection
    pub fn connection_closed(&self) {
        // Saturating: never wrap if a close races with a reset.
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Record a heartbeat eviction
    pub fn connection_evicted(&self) {
        self.connections_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound frame
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a queued outbound frame
    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped outbound frame
    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatched event and how many connections received it
    pub fn event_dispatched(&self, delivered: usize) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        self.events_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
    }

    /// Record a failed filter evaluation
    pub fn predicate_failed(&self) {
        self.predicate_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            predicate_failures: self.predicate_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Total connections ever accepted
    pub connections_total: u64,
    /// Currently registered connections
    pub connections_active: u64,
    /// Connections evicted by the heartbeat sweep
    pub connections_evicted: u64,
    /// Frames received from peers
    pub messages_received: u64,
    /// Frames queued to peers
    pub messages_sent: u64,
    /// Frames dropped on full or closed queues
    pub messages_dropped: u64,
    /// Change events dispatched
    pub events_dispatched: u64,
    /// Per-connection event deliveries
    pub events_delivered: u64,
    /// Failed filter evaluations
    pub predicate_failures: u64,
}
