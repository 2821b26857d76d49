//! Client error type.

/// Errors surfaced to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The outbound queue is full and the policy rejects new frames.
    #[error("Outbound queue is full")]
    QueueFull,

    /// The client was disconnected by its owner.
    #[error("Client is closed")]
    Closed,

    /// A transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connecting did not finish in time.
    #[error("Connection timed out")]
    Timeout,

    /// A frame could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
