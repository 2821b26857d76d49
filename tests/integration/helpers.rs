//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use futures::{SinkExt, StreamExt};
use http::{Request, StatusCode};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use livefeed_api::AppState;
use livefeed_auth::TokenPair;
use livefeed_core::config::AppConfig;
use livefeed_core::types::{Role, Subject};
use livefeed_realtime::RealtimeEngine;

/// How long a test waits for any expected frame.
pub const WAIT: Duration = Duration::from_secs(3);

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running server on an ephemeral port.
pub struct TestServer {
    pub engine: Arc<RealtimeEngine>,
    pub state: AppState,
    pub addr: String,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(AppConfig::default()).await
    }

    pub async fn start_with(config: AppConfig) -> Self {
        let engine = Arc::new(RealtimeEngine::new(config.realtime.clone(), &config.auth));
        engine.start().expect("engine start");
        let state = AppState::with_engine(config, Arc::clone(&engine));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        let serve_state = state.clone();
        let task = tokio::spawn(async move {
            livefeed_api::serve(listener, serve_state)
                .await
                .expect("server");
        });

        Self {
            engine,
            state,
            addr,
            task,
        }
    }

    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/ws?token={}", self.addr, token),
            None => format!("ws://{}/ws", self.addr),
        }
    }

    pub fn issue(&self, subject_id: &str) -> TokenPair {
        self.engine
            .tokens
            .issue(&Subject::new(subject_id, Role::Customer))
            .expect("issue")
    }

    /// Sends one HTTP request through the full middleware stack.
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = livefeed_api::build_app(self.state.clone())
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    pub async fn shutdown(self) {
        self.engine.shutdown().await.expect("shutdown");
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("server stopped")
            .expect("server task");
    }
}

pub async fn connect(url: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.expect("connect");
    ws
}

pub async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

/// Next JSON frame, skipping server heartbeats.
pub async fn recv_json(ws: &mut Ws) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("frame");
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(text.as_str()).expect("json frame");
            if value["type"] != "heartbeat" {
                return value;
            }
        }
    }
}

/// Asserts no data frame arrives within `within`.
pub async fn expect_silence(ws: &mut Ws, within: Duration) {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => {
                let value: Value = serde_json::from_str(text.as_str()).expect("json frame");
                assert_eq!(value["type"], "heartbeat", "unexpected frame: {value}");
            }
            Ok(Some(Ok(_))) => {}
            Ok(other) => panic!("socket ended while expecting silence: {other:?}"),
        }
    }
}

/// Waits until the socket is closed by the server.
pub async fn expect_closed(ws: &mut Ws) {
    loop {
        match tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("close within timeout")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

/// Polls `check` until it holds or the wait expires.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
