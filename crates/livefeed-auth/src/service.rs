//! Token service: issue, verify, rotate, and revoke.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use livefeed_core::config::AuthConfig;
use livefeed_core::types::{Subject, TokenId};

use crate::error::TokenError;
use crate::jwt::{Claims, JwtDecoder, JwtEncoder};
use crate::refresh::{RefreshRecord, RefreshTokenStore};

/// Result of a successful issuance or rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Single-use refresh token.
    pub refresh_token: String,
    /// Access token expiration.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token expiration.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Counts returned by [`TokenService::sweep_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Expired refresh records removed.
    pub refresh_records: usize,
    /// Denylisted access token ids whose tokens have expired anyway.
    pub denylist_entries: usize,
}

/// Issues and verifies access/refresh token pairs.
///
/// Access tokens are verified statelessly apart from a denylist of
/// explicitly revoked ids. Refresh tokens are tracked server-side and are
/// single-use.
#[derive(Debug)]
pub struct TokenService {
    encoder: JwtEncoder,
    decoder: JwtDecoder,
    refresh_store: RefreshTokenStore,
    /// Revoked access token id → its expiry.
    access_denylist: DashMap<TokenId, DateTime<Utc>>,
}

impl TokenService {
    /// Creates a token service from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoder: JwtEncoder::new(config),
            decoder: JwtDecoder::new(config),
            refresh_store: RefreshTokenStore::new(),
            access_denylist: DashMap::new(),
        }
    }

    /// Issues a fresh access + refresh pair and records the refresh token.
    pub fn issue(&self, subject: &Subject) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let access = self.encoder.access_claims(subject, now);
        let refresh = self.encoder.refresh_claims(subject, now);

        let access_token = self.encoder.encode(&access)?;
        let refresh_token = self.encoder.encode(&refresh)?;

        self.refresh_store.insert(
            refresh.jti,
            RefreshRecord {
                subject_id: subject.id.clone(),
                expires_at: refresh.expires_at(),
            },
        );

        debug!(subject_id = %subject.id, refresh_jti = %refresh.jti, "Issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at: access.expires_at(),
            refresh_expires_at: refresh.expires_at(),
        })
    }

    /// Verifies an access token and returns its subject.
    pub fn verify_access(&self, token: &str) -> Result<Subject, TokenError> {
        let claims = self.decoder.decode_access(token)?;
        if self.access_denylist.contains_key(&claims.jti) {
            return Err(TokenError::Revoked);
        }
        Ok(claims.subject())
    }

    /// Verifies a refresh token without consuming it.
    pub fn verify_refresh(&self, token: &str) -> Result<Subject, TokenError> {
        let claims = self.decode_refresh(token)?;
        let record = self
            .refresh_store
            .get(&claims.jti)
            .ok_or(TokenError::Revoked)?;
        self.check_record(&claims, &record)?;
        Ok(claims.subject())
    }

    /// Exchanges a refresh token for a new pair.
    ///
    /// The old record is removed before the new pair is issued, so a token
    /// can be redeemed at most once even under concurrent calls.
    pub fn rotate(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.decode_refresh(refresh_token)?;
        let Some(record) = self.refresh_store.take(&claims.jti) else {
            warn!(jti = %claims.jti, subject_id = %claims.sub, "Refresh token reuse or revoked token");
            return Err(TokenError::Revoked);
        };
        self.check_record(&claims, &record)?;

        let pair = self.issue(&claims.subject())?;
        info!(subject_id = %claims.sub, "Rotated refresh token");
        Ok(pair)
    }

    /// Revokes a single refresh token. Returns whether a record was removed.
    ///
    /// A correctly signed token is accepted even past its `exp`.
    pub fn revoke(&self, refresh_token: &str) -> Result<bool, TokenError> {
        let claims = self.decoder.decode_refresh_lapsed(refresh_token)?;
        let removed = self.refresh_store.remove(&claims.jti);
        debug!(jti = %claims.jti, removed, "Revoked refresh token");
        Ok(removed)
    }

    /// Revokes every outstanding refresh token for a subject.
    pub fn revoke_all(&self, subject_id: &str) -> usize {
        let removed = self.refresh_store.remove_subject(subject_id);
        info!(subject_id = %subject_id, removed, "Revoked all refresh tokens");
        removed
    }

    /// Denylists an access token until its natural expiry.
    pub fn revoke_access(&self, access_token: &str) -> Result<(), TokenError> {
        let claims = self.decoder.decode_access(access_token)?;
        self.access_denylist.insert(claims.jti, claims.expires_at());
        debug!(jti = %claims.jti, "Denylisted access token");
        Ok(())
    }

    /// Removes expired refresh records and stale denylist entries.
    ///
    /// Idempotent and safe to run concurrently with issuance and rotation.
    pub fn sweep_expired(&self) -> SweepStats {
        self.sweep_expired_at(Utc::now())
    }

    /// [`TokenService::sweep_expired`] against an explicit clock.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepStats {
        let refresh_records = self.refresh_store.purge_expired(now);

        let mut denylist_entries = 0usize;
        self.access_denylist.retain(|_, expires_at| {
            let keep = *expires_at > now;
            if !keep {
                denylist_entries += 1;
            }
            keep
        });

        SweepStats {
            refresh_records,
            denylist_entries,
        }
    }

    /// Number of outstanding refresh records.
    pub fn outstanding_refresh_tokens(&self) -> usize {
        self.refresh_store.len()
    }

    /// Decodes a refresh token, dropping its record if the JWT itself expired.
    fn decode_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        match self.decoder.decode_refresh(token) {
            Err(TokenError::Expired) => {
                if let Ok(claims) = self.decoder.decode_refresh_lapsed(token) {
                    let purged = self.refresh_store.remove(&claims.jti);
                    debug!(jti = %claims.jti, purged, "Refresh token expired");
                }
                Err(TokenError::Expired)
            }
            other => other,
        }
    }

    fn check_record(&self, claims: &Claims, record: &RefreshRecord) -> Result<(), TokenError> {
        if record.is_expired_at(Utc::now()) {
            self.refresh_store.remove(&claims.jti);
            return Err(TokenError::Expired);
        }
        if record.subject_id != claims.sub {
            warn!(jti = %claims.jti, "Refresh record subject mismatch");
            return Err(TokenError::SubjectMismatch);
        }
        Ok(())
    }
}
