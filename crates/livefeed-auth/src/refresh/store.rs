//! In-memory registry of outstanding refresh tokens.
//!
//! Single-process only: a multi-instance deployment would need this behind
//! a shared keyed store.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use livefeed_core::types::TokenId;

/// Server-side record for one refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    /// Subject the token was issued to.
    pub subject_id: String,
    /// When the token stops being redeemable.
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    /// Whether the record is past expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Refresh records keyed by token id.
///
/// Every operation is atomic per key; [`RefreshTokenStore::take`] is the
/// single-use primitive behind rotation.
#[derive(Debug, Default)]
pub struct RefreshTokenStore {
    records: DashMap<TokenId, RefreshRecord>,
}

impl RefreshTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Records a freshly issued refresh token.
    pub fn insert(&self, jti: TokenId, record: RefreshRecord) {
        self.records.insert(jti, record);
    }

    /// Returns a copy of the record without consuming it.
    pub fn get(&self, jti: &TokenId) -> Option<RefreshRecord> {
        self.records.get(jti).map(|entry| entry.value().clone())
    }

    /// Removes and returns the record. At most one caller ever gets `Some`.
    pub fn take(&self, jti: &TokenId) -> Option<RefreshRecord> {
        self.records.remove(jti).map(|(_, record)| record)
    }

    /// Removes the record, returning whether it existed.
    pub fn remove(&self, jti: &TokenId) -> bool {
        self.records.remove(jti).is_some()
    }

    /// Removes every record belonging to `subject_id`.
    pub fn remove_subject(&self, subject_id: &str) -> usize {
        let mut removed = 0usize;
        self.records.retain(|_, record| {
            let keep = record.subject_id != subject_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Removes every record past expiry at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0usize;
        self.records.retain(|_, record| {
            let keep = !record.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of outstanding records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
