//! Individual connection handle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use livefeed_core::protocol::OutboundMessage;
use livefeed_core::types::{ConnectionId, Subject};

/// Lifecycle of a connection. Authentication is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport accepted, not yet registered.
    Connecting = 0,
    /// Registered and exchanging frames.
    Open = 1,
    /// Termination in progress.
    Closing = 2,
    /// Removed from the registry.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why an outbound frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The connection is no longer open.
    NotOpen,
    /// The peer's queue is full.
    QueueFull,
    /// The transport task has gone away.
    Disconnected,
}

/// A handle to a single live connection.
///
/// The outbound queue and the close token are the registry's side of the
/// transport; the socket task owns the other ends.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// When the connection was accepted
    pub connected_at: DateTime<Utc>,
    /// Sender for outbound frames
    sender: mpsc::Sender<OutboundMessage>,
    /// Fires when the registry force-closes the transport
    close: CancellationToken,
    /// Current [`ConnectionState`]
    state: AtomicU8,
    /// Authenticated subject, if any
    subject: RwLock<Option<Subject>>,
    /// Last observed inbound activity
    last_activity: Mutex<Instant>,
}

impl ConnectionHandle {
    /// Create a new open connection handle
    pub fn new(sender: mpsc::Sender<OutboundMessage>, close: CancellationToken) -> Self {
        Self {
            id: ConnectionId::new(),
            connected_at: Utc::now(),
            sender,
            close,
            state: AtomicU8::new(ConnectionState::Open as u8),
            subject: RwLock::new(None),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Queue a frame without waiting
    pub fn try_send(&self, msg: OutboundMessage) -> Result<(), SendFailure> {
        if !self.is_open() {
            return Err(SendFailure::NotOpen);
        }
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, "Send buffer full, dropping message");
                Err(SendFailure::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendFailure::Disconnected),
        }
    }

    /// Whether the transport task has dropped its end of the queue
    pub fn is_transport_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether frames may still be exchanged
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Moves `Open` to `Closing`. Only the first caller wins.
    pub fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Signals the transport task to stop and marks the handle closed
    pub fn finish_close(&self) {
        self.close.cancel();
        self.state
            .store(ConnectionState::Closed as u8, Ordering::SeqCst);
    }

    /// Authenticated subject, if any
    pub fn subject(&self) -> Option<Subject> {
        self.subject
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a subject has been attached
    pub fn is_authenticated(&self) -> bool {
        self.subject
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Attaches a subject, returning the previous one
    pub fn set_subject(&self, subject: Subject) -> Option<Subject> {
        self.subject
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subject)
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Sets last activity to `at`
    pub fn touch_at(&self, at: Instant) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Last observed inbound activity
    pub fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a snapshot of connection info
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state: self.state(),
            subject: self.subject(),
            connected_at: self.connected_at,
        }
    }
}

/// Snapshot of connection info (serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Lifecycle state
    pub state: ConnectionState,
    /// Authenticated subject
    pub subject: Option<Subject>,
    /// Connected at
    pub connected_at: DateTime<Utc>,
}
