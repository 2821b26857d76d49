//! Resilient WebSocket client.
//!
//! A single background task owns the socket. It connects, re-authenticates
//! with the held token, replays active subscriptions, and then flushes the
//! outbound queue in order. When the socket is lost it reconnects with
//! exponential backoff until the attempt budget runs out and the client
//! settles in [`ClientState::Failed`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livefeed_core::protocol::{InboundMessage, OutboundMessage};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::queue::OutboundQueue;
use crate::subscription::Topic;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Not connected and not trying to.
    Closed,
    /// Handshake in progress.
    Connecting,
    /// Socket open.
    Open,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Attempts exhausted; needs [`LiveFeedClient::reconnect`].
    Failed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// State shared between the handle and the socket task.
struct Shared {
    state: watch::Sender<ClientState>,
    queue: Mutex<OutboundQueue>,
    token: Mutex<Option<String>>,
    topics: Mutex<BTreeMap<String, Topic>>,
    /// Signalled when frames are queued.
    wake: Notify,
    /// Signalled by an explicit reconnect request.
    retry: Notify,
    closed: CancellationToken,
}

impl Shared {
    fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ClientState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Client state changed");
        }
    }

    fn enqueue(&self, message: InboundMessage) -> ClientResult<()> {
        let evicted = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message)?;
        if evicted.is_some() {
            warn!("Outbound queue full, dropped oldest frame");
        }
        self.wake.notify_one();
        Ok(())
    }

    fn pop_queued(&self) -> Option<InboundMessage> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn restore(&self, message: InboundMessage) {
        let kept = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .restore(message);
        if !kept {
            warn!("Outbound queue full, dropped unsent frame");
        }
    }

    /// Frames sent right after the socket opens: authentication first, then
    /// every remembered subscription.
    fn handshake(&self) -> Vec<InboundMessage> {
        let mut frames = Vec::new();
        if let Some(token) = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            frames.push(InboundMessage::Authenticate { token });
        }
        frames.extend(
            self.topics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .map(Topic::subscribe_message),
        );
        frames
    }
}

/// Why an open session ended.
enum SessionEnd {
    /// The owner asked to disconnect.
    Requested,
    /// The socket was lost.
    Lost(String),
}

/// Handle to a resilient LiveFeed connection.
pub struct LiveFeedClient {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for LiveFeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveFeedClient")
            .field("state", &self.state())
            .finish()
    }
}

impl LiveFeedClient {
    /// Starts connecting in the background.
    ///
    /// Server frames other than keepalives arrive on the returned receiver.
    pub fn connect(config: ClientConfig) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (state, _) = watch::channel(ClientState::Connecting);
        let shared = Arc::new(Shared {
            state,
            queue: Mutex::new(OutboundQueue::new(config.queue_capacity, config.overflow)),
            token: Mutex::new(None),
            topics: Mutex::new(BTreeMap::new()),
            wake: Notify::new(),
            retry: Notify::new(),
            closed: CancellationToken::new(),
        });

        let task = tokio::spawn(run(shared.clone(), config, events_tx));

        let client = Self {
            shared,
            task: Mutex::new(Some(task)),
        };
        (client, events_rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    /// Waits until the client reaches `target`. Returns false on timeout.
    pub async fn wait_for_state(&self, target: ClientState, within: Duration) -> bool {
        let mut rx = self.shared.state.subscribe();
        tokio::time::timeout(within, rx.wait_for(|state| *state == target))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }

    /// Holds `token` and presents it now and after every reconnect.
    pub fn authenticate(&self, token: impl Into<String>) -> ClientResult<()> {
        self.ensure_running()?;
        let token = token.into();
        *self.shared.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        if self.state() == ClientState::Open {
            self.shared.enqueue(InboundMessage::Authenticate { token })?;
        }
        Ok(())
    }

    /// Subscribes and remembers the topic for replay after reconnect.
    pub fn subscribe(&self, topic: Topic) -> ClientResult<()> {
        self.ensure_running()?;
        let message = topic.subscribe_message();
        self.shared
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.key(), topic);
        if self.state() == ClientState::Open {
            self.shared.enqueue(message)?;
        }
        Ok(())
    }

    /// Forgets a topic and unsubscribes from it.
    pub fn unsubscribe(&self, topic: &Topic) -> ClientResult<()> {
        self.ensure_running()?;
        let removed = self
            .shared
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&topic.key());
        if removed.is_some() && self.state() == ClientState::Open {
            self.shared.enqueue(topic.unsubscribe_message())?;
        }
        Ok(())
    }

    /// Forgets every topic.
    pub fn unsubscribe_all(&self) -> ClientResult<()> {
        self.ensure_running()?;
        self.shared
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if self.state() == ClientState::Open {
            self.shared.enqueue(InboundMessage::Unsubscribe {
                entity_type: None,
                entity_id: None,
                all: true,
            })?;
        }
        Ok(())
    }

    /// Queues a frame. Frames are written in order once the socket is open.
    pub fn send(&self, message: InboundMessage) -> ClientResult<()> {
        self.ensure_running()?;
        self.shared.enqueue(message)
    }

    /// Restarts connection attempts after the client has failed.
    pub fn reconnect(&self) -> ClientResult<()> {
        self.ensure_running()?;
        if self.state() == ClientState::Failed {
            self.shared.retry.notify_one();
        }
        Ok(())
    }

    /// Topics currently remembered.
    pub fn topics(&self) -> Vec<Topic> {
        self.shared
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Frames waiting to be written.
    pub fn queued(&self) -> usize {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Closes the socket and stops reconnecting.
    pub async fn disconnect(&self) {
        self.shared.closed.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Client task ended abnormally");
            }
        }
    }

    fn ensure_running(&self) -> ClientResult<()> {
        if self.shared.closed.is_cancelled() {
            return Err(ClientError::Closed);
        }
        Ok(())
    }
}

impl Drop for LiveFeedClient {
    fn drop(&mut self) {
        self.shared.closed.cancel();
    }
}

/// Socket task: connect, serve, back off, repeat.
async fn run(
    shared: Arc<Shared>,
    config: ClientConfig,
    events: mpsc::Sender<OutboundMessage>,
) {
    let mut attempt: u32 = 0;

    'outer: loop {
        shared.set_state(ClientState::Connecting);

        let connecting = tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        );
        let result = tokio::select! {
            _ = shared.closed.cancelled() => break,
            result = connecting => result,
        };

        match result {
            Ok(Ok((mut ws, _))) => {
                attempt = 0;
                shared.set_state(ClientState::Open);
                info!(url = %config.url, "Connected");

                match run_session(&mut ws, &shared, &config, &events).await {
                    SessionEnd::Requested => break,
                    SessionEnd::Lost(reason) => {
                        warn!(url = %config.url, reason = %reason, "Connection lost");
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(url = %config.url, attempt, error = %e, "Connection attempt failed");
            }
            Err(_) => {
                warn!(url = %config.url, attempt, "Connection attempt timed out");
            }
        }

        attempt = attempt.saturating_add(1);
        match config.reconnect.delay_for(attempt) {
            Some(delay) => {
                shared.set_state(ClientState::Reconnecting);
                debug!(attempt, delay = ?delay, "Scheduling reconnect");
                tokio::select! {
                    _ = shared.closed.cancelled() => break 'outer,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                shared.set_state(ClientState::Failed);
                warn!(
                    url = %config.url,
                    max_attempts = config.reconnect.max_attempts,
                    "Reconnect attempts exhausted"
                );
                tokio::select! {
                    _ = shared.closed.cancelled() => break 'outer,
                    _ = shared.retry.notified() => {
                        info!(url = %config.url, "Reconnect requested");
                        attempt = 0;
                    }
                }
            }
        }
    }

    shared.set_state(ClientState::Closed);
    debug!(url = %config.url, "Client task stopped");
}

async fn run_session(
    ws: &mut WsStream,
    shared: &Shared,
    config: &ClientConfig,
    events: &mpsc::Sender<OutboundMessage>,
) -> SessionEnd {
    for message in shared.handshake() {
        if let Err(e) = send_frame(ws, &message).await {
            return SessionEnd::Lost(e.to_string());
        }
    }

    let started = Instant::now();
    let mut keepalive =
        tokio::time::interval_at(started + config.keepalive_interval, config.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_inbound = started;

    loop {
        if let Err(e) = flush(ws, shared).await {
            return SessionEnd::Lost(e.to_string());
        }

        tokio::select! {
            _ = shared.closed.cancelled() => {
                if let Err(e) = ws.close(None).await {
                    debug!(error = %e, "Close handshake failed");
                }
                return SessionEnd::Requested;
            }
            _ = shared.wake.notified() => {}
            _ = keepalive.tick() => {
                if last_inbound.elapsed() > config.stale_timeout {
                    return SessionEnd::Lost("no traffic within stale timeout".to_string());
                }
                if let Err(e) = send_frame(ws, &InboundMessage::Ping).await {
                    return SessionEnd::Lost(e.to_string());
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_inbound = Instant::now();
                    forward(text.as_str(), events);
                }
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Lost("closed by server".to_string());
                }
                Some(Ok(_)) => {
                    last_inbound = Instant::now();
                }
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
            },
        }
    }
}

/// Writes queued frames until the queue is empty or the socket fails.
async fn flush(ws: &mut WsStream, shared: &Shared) -> ClientResult<()> {
    while let Some(message) = shared.pop_queued() {
        match send_frame(ws, &message).await {
            Ok(()) => {}
            Err(ClientError::Serialization(e)) => {
                warn!(error = %e, "Dropping frame that failed to encode");
            }
            Err(e) => {
                shared.restore(message);
                return Err(e);
            }
        }
    }
    Ok(())
}

async fn send_frame(ws: &mut WsStream, message: &InboundMessage) -> ClientResult<()> {
    let payload = serde_json::to_string(message)?;
    ws.send(Message::Text(payload.into())).await?;
    Ok(())
}

/// Hands a server frame to the caller. Keepalive frames stop here.
fn forward(text: &str, events: &mpsc::Sender<OutboundMessage>) {
    match serde_json::from_str::<OutboundMessage>(text) {
        Ok(OutboundMessage::Heartbeat { .. } | OutboundMessage::Pong { .. }) => {}
        Ok(frame) => {
            if let Err(mpsc::error::TrySendError::Full(_)) = events.try_send(frame) {
                warn!("Event buffer full, dropping server frame");
            }
        }
        Err(e) => warn!(error = %e, "Ignoring unparseable server frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefeed_core::protocol::KindFilter;
    use livefeed_core::types::EntityType;
    use tokio::net::TcpListener;

    use crate::backoff::ReconnectPolicy;
    use crate::queue::OverflowPolicy;

    type ServerWs = WebSocketStream<TcpStream>;

    const WAIT: Duration = Duration::from_secs(3);

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .unwrap()
            .unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_inbound(ws: &mut ServerWs) -> InboundMessage {
        loop {
            let frame = tokio::time::timeout(WAIT, ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    fn fast(url: &str) -> ClientConfig {
        ClientConfig::new(url)
            .with_reconnect(ReconnectPolicy::new(
                Duration::from_millis(20),
                Duration::from_millis(80),
                5,
            ))
            .with_keepalive(Duration::from_secs(60))
            .with_stale_timeout(Duration::from_secs(120))
    }

    fn orders_42() -> Topic {
        Topic::entity(EntityType::Order, 42u64)
    }

    #[tokio::test]
    async fn test_queued_frames_flush_after_handshake_in_order() {
        let (listener, url) = listener().await;
        let (client, _events) = LiveFeedClient::connect(fast(&url));

        client.authenticate("tok").unwrap();
        client.subscribe(orders_42()).unwrap();
        client.send(InboundMessage::Pong { timestamp: Some(1) }).unwrap();
        client.send(InboundMessage::Pong { timestamp: Some(2) }).unwrap();

        let mut server = accept(&listener).await;
        assert_eq!(
            next_inbound(&mut server).await,
            InboundMessage::Authenticate {
                token: "tok".to_string()
            }
        );
        match next_inbound(&mut server).await {
            InboundMessage::Subscribe {
                entity_type,
                entity_id,
                ..
            } => {
                assert_eq!(entity_type, "orders");
                assert_eq!(entity_id.unwrap().as_str(), "42");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(
            next_inbound(&mut server).await,
            InboundMessage::Pong { timestamp: Some(1) }
        );
        assert_eq!(
            next_inbound(&mut server).await,
            InboundMessage::Pong { timestamp: Some(2) }
        );

        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_reconnect_reauthenticates_and_resubscribes() {
        let (listener, url) = listener().await;
        let (client, mut events) = LiveFeedClient::connect(fast(&url));
        client.authenticate("tok").unwrap();
        client
            .subscribe(Topic::entity_type(EntityType::Product).with_event_kind(
                livefeed_core::events::EventKind::Created,
            ))
            .unwrap();

        let mut first = accept(&listener).await;
        assert!(matches!(
            next_inbound(&mut first).await,
            InboundMessage::Authenticate { .. }
        ));
        assert!(matches!(
            next_inbound(&mut first).await,
            InboundMessage::Subscribe { .. }
        ));
        first.close(None).await.unwrap();
        drop(first);

        let mut second = accept(&listener).await;
        assert_eq!(
            next_inbound(&mut second).await,
            InboundMessage::Authenticate {
                token: "tok".to_string()
            }
        );
        match next_inbound(&mut second).await {
            InboundMessage::Subscribe {
                entity_type,
                event_kind,
                ..
            } => {
                assert_eq!(entity_type, "products");
                assert_eq!(event_kind, Some(KindFilter::Created));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(client.wait_for_state(ClientState::Open, WAIT).await);

        let frame = OutboundMessage::UnsubscriptionResponse { success: true };
        second
            .send(Message::Text(serde_json::to_string(&frame).unwrap().into()))
            .await
            .unwrap();
        let received = tokio::time::timeout(WAIT, events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, frame);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_long_backoff_reports_reconnecting_until_disconnect() {
        let (listener, url) = listener().await;
        drop(listener);

        let config = ClientConfig::new(url).with_reconnect(ReconnectPolicy::new(
            Duration::from_secs(3600),
            Duration::from_secs(86_400),
            3,
        ));
        let (client, _events) = LiveFeedClient::connect(config);

        assert!(client.wait_for_state(ClientState::Reconnecting, WAIT).await);
        assert_eq!(client.state(), ClientState::Reconnecting);

        tokio::time::timeout(WAIT, client.disconnect()).await.unwrap();
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_fails_after_attempts_exhausted() {
        let (listener, url) = listener().await;
        drop(listener);

        let config = ClientConfig::new(url).with_reconnect(ReconnectPolicy::new(
            Duration::from_millis(5),
            Duration::from_millis(10),
            3,
        ));
        let (client, _events) = LiveFeedClient::connect(config);

        assert!(client.wait_for_state(ClientState::Failed, WAIT).await);
        client.send(InboundMessage::Ping).unwrap();
        assert_eq!(client.queued(), 1);

        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Closed);
        assert!(matches!(
            client.send(InboundMessage::Ping),
            Err(ClientError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_silence_triggers_preemptive_reconnect() {
        let (listener, url) = listener().await;
        let config = fast(&url)
            .with_keepalive(Duration::from_millis(30))
            .with_stale_timeout(Duration::from_millis(100));
        let (client, _events) = LiveFeedClient::connect(config);

        // Never answers; the client must give up on it by itself.
        let _silent = accept(&listener).await;
        let _second = accept(&listener).await;

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_reject_new_when_queue_full() {
        let (listener, url) = listener().await;
        drop(listener);

        let config = ClientConfig::new(url)
            .with_reconnect(ReconnectPolicy::new(
                Duration::from_secs(60),
                Duration::from_secs(60),
                1,
            ))
            .with_queue(1, OverflowPolicy::RejectNew);
        let (client, _events) = LiveFeedClient::connect(config);

        client.send(InboundMessage::Ping).unwrap();
        assert!(matches!(
            client.send(InboundMessage::Ping),
            Err(ClientError::QueueFull)
        ));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_forgets_topic() {
        let (listener, url) = listener().await;
        drop(listener);
        let (client, _events) = LiveFeedClient::connect(fast(&url));

        client.subscribe(orders_42()).unwrap();
        client
            .subscribe(orders_42().with_field("status", "shipped"))
            .unwrap();
        assert_eq!(client.topics().len(), 1);

        client.unsubscribe(&orders_42()).unwrap();
        assert!(client.topics().is_empty());
        client.disconnect().await;
    }
}
