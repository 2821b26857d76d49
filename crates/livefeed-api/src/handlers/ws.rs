//! WebSocket upgrade handler.

use std::fmt;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livefeed_core::error::AppError;
use livefeed_core::protocol::{ErrorCode, ErrorFrame, OutboundMessage};
use livefeed_core::types::ConnectionId;
use livefeed_realtime::AcceptedConnection;

use crate::error::ApiError;
use crate::state::AppState;

/// Optional query parameter authenticating the socket on connect.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Access token.
    pub token: Option<String>,
}

/// GET /ws?token={access}: WebSocket upgrade
///
/// The token is optional; a peer may connect anonymously and send an
/// `authenticate` frame later.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Response {
    if state.realtime.is_shutting_down() {
        return ApiError(AppError::service_unavailable("Server is shutting down")).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(state, socket, query.token))
}

/// Drives one established socket until either side closes it.
async fn handle_socket(state: AppState, socket: WebSocket, token: Option<String>) {
    let (ws_tx, mut ws_rx) = socket.split();
    let connections = state.realtime.connections.clone();

    let AcceptedConnection {
        id: conn_id,
        outbound,
        closed,
    } = connections.accept();

    info!(conn_id = %conn_id, "WebSocket connection established");

    let send_timeout = state.config.realtime.send_timeout();
    let forwarder = tokio::spawn({
        let connections = connections.clone();
        let closed = closed.clone();
        async move {
            let end = forward_outbound(conn_id, ws_tx, outbound, closed, send_timeout).await;
            if end != ForwardEnd::Closed {
                connections.terminate(conn_id);
            }
        }
    });

    if let Some(token) = token.as_deref() {
        if let Err(e) = connections.authenticate(conn_id, token).await {
            debug!(conn_id = %conn_id, error = %e, "Connect-time authentication failed");
        }
    }

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    connections.handle_inbound(conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    connections.touch(conn_id);
                    connections.send(
                        conn_id,
                        OutboundMessage::error(ErrorFrame::new(
                            ErrorCode::InvalidInput,
                            "Binary frames are not supported",
                        )),
                    );
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    connections.touch(conn_id);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    connections.terminate(conn_id);
    finish_forwarder(conn_id, forwarder, send_timeout).await;

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Why the outbound forwarder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardEnd {
    /// The registry closed the connection and the queue was flushed.
    Closed,
    /// The socket rejected a write.
    SendFailed,
    /// A write did not complete within the send timeout.
    Stalled,
}

/// Writes queued frames to `sink` until the connection closes.
///
/// Frames already queued when `closed` fires are still written, followed by
/// a `Close` frame. Every write is bounded by `send_timeout`.
async fn forward_outbound<S>(
    conn_id: ConnectionId,
    mut sink: S,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    closed: CancellationToken,
    send_timeout: Duration,
) -> ForwardEnd
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let end = loop {
        let msg = tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(msg) => msg,
                None => break ForwardEnd::Closed,
            },
            _ = closed.cancelled() => break ForwardEnd::Closed,
        };
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Failed to encode frame");
                continue;
            }
        };
        match timeout(send_timeout, sink.send(Message::Text(text.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "Socket write failed");
                break ForwardEnd::SendFailed;
            }
            Err(_) => {
                warn!(conn_id = %conn_id, timeout = ?send_timeout, "Socket write stalled");
                break ForwardEnd::Stalled;
            }
        }
    };

    if end == ForwardEnd::Closed
        && timeout(send_timeout, sink.send(Message::Close(None)))
            .await
            .is_err()
    {
        debug!(conn_id = %conn_id, "Close frame not delivered in time");
    }
    end
}

/// Waits up to `within` for the forwarder, aborting it past that.
///
/// Returns whether it finished on its own.
async fn finish_forwarder(conn_id: ConnectionId, mut task: JoinHandle<()>, within: Duration) -> bool {
    match timeout(within, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(conn_id = %conn_id, error = %e, "Outbound forwarder ended abnormally");
            true
        }
        Err(_) => {
            warn!(conn_id = %conn_id, "Outbound forwarder did not finish, aborting");
            task.abort();
            false
        }
    }
}
