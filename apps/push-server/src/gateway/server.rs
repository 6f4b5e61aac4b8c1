//! WebSocket upgrade handler and per-connection event loop.

use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use komob_common::id::{prefix, prefixed_ulid};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::auth::verifier::VerifyError;
use crate::AppState;

use super::events::{ClientEvent, ServerEvent};
use super::handshake::{AuthStep, Handshake, HandshakeState};
use super::session::ClientHandle;

/// Close codes.
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", any(ws_upgrade))
}

/// Upgrade socket requests; plain requests get the placeholder page.
async fn ws_upgrade(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_connection(socket, state))
            .into_response(),
        Err(_) => crate::routes::index::placeholder().await.into_response(),
    }
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let connection_id = prefixed_ulid(prefix::CONNECTION);
    tracing::debug!(%connection_id, "new client connected");

    let (handle, mut outbound_rx) = ClientHandle::new(connection_id.clone());
    let mut handshake = Handshake::new(
        handle,
        state.sessions.clone(),
        state.supported_versions.clone(),
    );

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (verify_tx, mut verify_rx) = mpsc::channel::<Result<String, VerifyError>>(1);
    let mut verification: Option<JoinHandle<()>> = None;

    let handshake_deadline = time::sleep(state.config.handshake_timeout);
    tokio::pin!(handshake_deadline);

    let mut heartbeat = time::interval(state.config.heartbeat_interval);
    heartbeat.tick().await; // First tick fires immediately; skip it.
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        match ClientEvent::parse(&text) {
                            Some(ClientEvent::Auth(payload)) => {
                                if let AuthStep::Verify(session_token) = handshake.on_auth(&payload) {
                                    let verifier = state.verifier.clone();
                                    let tx = verify_tx.clone();
                                    verification = Some(tokio::spawn(async move {
                                        let result = verifier.verify(&session_token).await;
                                        let _ = tx.send(result).await;
                                    }));
                                }
                            }
                            Some(ClientEvent::Other(event)) => {
                                tracing::debug!(%connection_id, %event, "ignoring client event");
                            }
                            None => {
                                tracing::debug!(%connection_id, "ignoring undecodable frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => last_seen = Instant::now(),
                    Some(Err(e)) => {
                        tracing::warn!(%connection_id, ?e, "client connection error");
                        break;
                    }
                }
            }

            // Verifier finished.
            Some(result) = verify_rx.recv() => {
                handshake.on_verified(result);
            }

            // Reply or push notification for this client.
            Some(event) = outbound_rx.recv() => {
                if send_event(&mut ws_tx, &event).await.is_err() {
                    break;
                }
                if event.is_terminal() {
                    let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "").await;
                    break;
                }
            }

            _ = &mut handshake_deadline, if handshake.state() != HandshakeState::Authenticated => {
                tracing::debug!(%connection_id, "handshake timeout, closing connection");
                let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
                break;
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > state.config.heartbeat_timeout {
                    tracing::debug!(%connection_id, "heartbeat timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(task) = verification {
        task.abort();
    }
    handshake.close();
    tracing::debug!(%connection_id, "lost connection to a client");
}

async fn send_event(ws_tx: &mut WsSink, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event.to_frame()).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
