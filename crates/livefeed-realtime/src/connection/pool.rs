//! Connection pool: tracks all live connections, indexed by subject.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use livefeed_core::types::ConnectionId;

use super::handle::ConnectionHandle;

/// Thread-safe pool of all live connections.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    /// Connection ID → connection handle for direct lookup.
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// Subject ID → connections authenticated as that subject.
    by_subject: DashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the pool.
    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        self.by_id.insert(handle.id, handle);
    }

    /// Files a connection under a subject, moving it off any previous one.
    pub fn bind_subject(&self, conn_id: ConnectionId, previous: Option<&str>, subject_id: &str) {
        if let Some(previous) = previous {
            self.unbind_subject(conn_id, previous);
        }
        self.by_subject
            .entry(subject_id.to_string())
            .or_default()
            .insert(conn_id);
    }

    /// Removes a connection from a subject's set.
    pub fn unbind_subject(&self, conn_id: ConnectionId, subject_id: &str) {
        if let Some(mut connections) = self.by_subject.get_mut(subject_id) {
            connections.remove(&conn_id);
            if connections.is_empty() {
                drop(connections);
                self.by_subject
                    .remove_if(subject_id, |_, connections| connections.is_empty());
            }
        }
    }

    /// Removes a connection from the pool.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.by_id.remove(conn_id)?;
        if let Some(subject) = handle.subject() {
            self.unbind_subject(*conn_id, &subject.id);
        }
        Some(handle)
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Gets all connections authenticated as a subject.
    pub fn subject_connections(&self, subject_id: &str) -> Vec<ConnectionId> {
        self.by_subject
            .get(subject_id)
            .map(|entry| entry.value().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of distinct authenticated subjects.
    pub fn subject_count(&self) -> usize {
        self.by_subject.len()
    }

    /// Returns all connection handles.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
