//! Per-connection authentication state machine.
//!
//! ```text
//! Unauthenticated ──auth──▶ PendingVerification ──ok──▶ Authenticated
//!        │                          │                        │
//!        └──────────────────────────┴──── close / abort ─────┴──▶ Closed
//! ```
//!
//! The machine never touches the socket. Replies go out through the
//! connection's [`ClientHandle`]; a terminal reply (see
//! [`ServerEvent::is_terminal`]) tells the socket task to abort after writing
//! it.

use std::collections::HashSet;
use std::sync::Arc;

use komob_common::Reason;

use crate::auth::verifier::VerifyError;

use super::events::ServerEvent;
use super::registry::SessionStore;
use super::session::{ClientHandle, Subscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unauthenticated,
    PendingVerification,
    Authenticated,
    Closed,
}

/// The three fields of a `komob_auth` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub version: String,
    pub session_token: String,
    pub mobwrite_id: String,
}

impl AuthRequest {
    /// Split `version\nsessionToken\nmobwriteId`. Anything other than exactly
    /// three fields is rejected.
    pub fn parse(payload: &str) -> Option<Self> {
        let mut fields = payload.split('\n');
        let (Some(version), Some(session_token), Some(mobwrite_id), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return None;
        };
        Some(Self {
            version: version.to_string(),
            session_token: session_token.to_string(),
            mobwrite_id: mobwrite_id.to_string(),
        })
    }
}

/// What the socket task should do after an auth message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Verify this session token and report back via [`Handshake::on_verified`].
    Verify(String),
    /// A terminal reply with this reason was queued.
    Rejected(Reason),
    /// The message arrived outside `Unauthenticated` and was dropped.
    Ignored,
}

pub struct Handshake {
    state: HandshakeState,
    handle: ClientHandle,
    store: Arc<SessionStore>,
    supported_versions: Arc<HashSet<String>>,
    mobwrite_id: Option<String>,
    user_id: Option<String>,
}

impl Handshake {
    pub fn new(
        handle: ClientHandle,
        store: Arc<SessionStore>,
        supported_versions: Arc<HashSet<String>>,
    ) -> Self {
        Self {
            state: HandshakeState::Unauthenticated,
            handle,
            store,
            supported_versions,
            mobwrite_id: None,
            user_id: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn connection_id(&self) -> &str {
        self.handle.connection_id()
    }

    /// Verified user id, once authenticated.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Handle a `komob_auth` payload.
    ///
    /// Only the first auth message counts: anything arriving while pending or
    /// authenticated is logged and dropped without a reply.
    pub fn on_auth(&mut self, payload: &str) -> AuthStep {
        if self.state != HandshakeState::Unauthenticated {
            tracing::warn!(
                connection_id = %self.connection_id(),
                state = ?self.state,
                "unexpected client message"
            );
            return AuthStep::Ignored;
        }

        let Some(request) = AuthRequest::parse(payload) else {
            return self.reject(ServerEvent::Error(Reason::Invalid));
        };

        if !self.supported_versions.contains(&request.version) {
            tracing::warn!(
                connection_id = %self.connection_id(),
                version = %request.version,
                "client with unsupported version"
            );
            return self.reject(ServerEvent::AuthRejected(Reason::Version));
        }

        if request.session_token.is_empty() || request.mobwrite_id.is_empty() {
            return self.reject(ServerEvent::Error(Reason::Invalid));
        }

        self.state = HandshakeState::PendingVerification;
        self.mobwrite_id = Some(request.mobwrite_id);
        AuthStep::Verify(request.session_token)
    }

    /// Apply the verifier's verdict. Results arriving in any state other than
    /// `PendingVerification` are discarded.
    pub fn on_verified(&mut self, result: Result<String, VerifyError>) -> HandshakeState {
        if self.state != HandshakeState::PendingVerification {
            tracing::debug!(
                connection_id = %self.connection_id(),
                state = ?self.state,
                "discarding late verification result"
            );
            return self.state;
        }

        match result {
            Ok(user_id) => {
                // The ack is queued before the connection becomes visible to
                // the fan-out, so no push can overtake it.
                self.handle.send(ServerEvent::AuthAccepted);
                let mobwrite_id = self.mobwrite_id.clone().unwrap_or_default();
                let subscriber = Subscriber::new(user_id.clone(), mobwrite_id, self.handle.clone());
                self.store.register(Arc::new(subscriber));
                self.state = HandshakeState::Authenticated;
                tracing::debug!(
                    connection_id = %self.connection_id(),
                    %user_id,
                    mobwrite_id = ?self.mobwrite_id,
                    users = self.store.user_count(),
                    connections = self.store.connection_count(),
                    "client authenticated"
                );
                self.user_id = Some(user_id);
            }
            Err(VerifyError::Unavailable) => {
                tracing::error!(
                    connection_id = %self.connection_id(),
                    "verification backend unavailable"
                );
                self.reject(ServerEvent::Error(Reason::Unavailable));
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id(),
                    reason = %e.reason(),
                    "authentication failed"
                );
                self.reject(ServerEvent::AuthRejected(e.reason()));
            }
        }
        self.state
    }

    /// Drive the machine to `Closed`, leaving the session store if
    /// authenticated. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == HandshakeState::Authenticated {
            if let Some(user_id) = &self.user_id {
                if self.store.unregister(user_id, self.handle.connection_id()) {
                    tracing::debug!(
                        connection_id = %self.handle.connection_id(),
                        %user_id,
                        users = self.store.user_count(),
                        connections = self.store.connection_count(),
                        "client left session store"
                    );
                }
            }
        }
        self.state = HandshakeState::Closed;
    }

    fn reject(&mut self, reply: ServerEvent) -> AuthStep {
        let reason = match reply {
            ServerEvent::AuthRejected(reason) | ServerEvent::Error(reason) => reason,
            _ => Reason::Invalid,
        };
        self.handle.send(reply);
        self.close();
        AuthStep::Rejected(reason)
    }
}

impl Drop for Handshake {
    fn drop(&mut self) {
        self.close();
    }
}
