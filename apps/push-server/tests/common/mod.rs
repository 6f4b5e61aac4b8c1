#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use komob_common::Frame;
use push_server::auth::verifier::{IdentityVerifier, VerifyError};
use push_server::config::Config;
use push_server::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsWrite = SplitSink<WsStream, Message>;
pub type WsRead = SplitStream<WsStream>;

/// Verifier with canned answers per session token. Unknown tokens are
/// rejected as bad credentials.
#[derive(Default)]
pub struct StubVerifier {
    answers: Mutex<HashMap<String, Result<String, VerifyError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call only after `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn answer(self, session_token: &str, result: Result<String, VerifyError>) -> Self {
        self.answers.lock().insert(session_token.to_string(), result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(&self, session_token: &str) -> Result<String, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            time::sleep(self.delay).await;
        }
        self.answers
            .lock()
            .get(session_token)
            .cloned()
            .unwrap_or(Err(VerifyError::Credentials))
    }
}

/// Default configuration with no environment involved.
pub fn test_config() -> Config {
    Config::from_lookup(|_| None).expect("default config")
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_server(config: Config, verifier: Arc<StubVerifier>) -> (SocketAddr, AppState) {
    let state = AppState::new(config, verifier);
    let app = push_server::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

pub async fn connect(addr: SocketAddr) -> (WsWrite, WsRead) {
    let url = format!("ws://{addr}/socket");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream.split()
}

pub async fn send_auth(write: &mut WsWrite, payload: &str) {
    let frame = Frame::new(
        komob_common::protocol::EVENT_AUTH,
        vec![serde_json::Value::String(payload.to_string())],
    );
    write
        .send(Message::Text(serde_json::to_string(&frame).unwrap().into()))
        .await
        .expect("send auth");
}

/// Next server message that is not a ping/pong. `None` means the server
/// closed the connection.
pub async fn next_message(read: &mut WsRead) -> Option<Message> {
    loop {
        let msg = time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("timeout waiting for server message");
        match msg {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(msg)) => return Some(msg),
            Some(Err(_)) | None => return None,
        }
    }
}

/// Next event frame from the server.
pub async fn next_frame(read: &mut WsRead) -> Frame {
    match next_message(read).await {
        Some(Message::Text(text)) => serde_json::from_str(&text).expect("parse frame"),
        other => panic!("expected a text frame, got: {other:?}"),
    }
}

/// Assert the server closes the connection next.
pub async fn expect_closed(read: &mut WsRead) {
    match next_message(read).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected the connection to close, got: {other:?}"),
    }
}

/// Assert nothing but pings arrives within `window`.
pub async fn expect_silence(read: &mut WsRead, window: Duration) {
    let deadline = time::Instant::now() + window;
    loop {
        match time::timeout_at(deadline, read.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got: {other:?}"),
        }
    }
}

/// Connect, authenticate, and consume the success reply.
pub async fn authenticate(addr: SocketAddr, payload: &str) -> (WsWrite, WsRead) {
    let (mut write, mut read) = connect(addr).await;
    send_auth(&mut write, payload).await;
    let reply = next_frame(&mut read).await;
    assert_eq!(reply.event, "komob_auth");
    assert_eq!(reply.args, vec![serde_json::json!(true)]);
    (write, read)
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(time::Instant::now() < deadline, "condition not met in time");
        time::sleep(Duration::from_millis(10)).await;
    }
}
