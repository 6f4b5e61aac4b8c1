//! Per-connection handles shared between the socket task and the fan-out.

use tokio::sync::mpsc;

use super::events::ServerEvent;

/// Outbound half of one client connection.
///
/// Cloneable; events pushed here are written to the socket by the
/// connection's own task.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    connection_id: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ClientHandle {
    pub fn new(connection_id: String) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { connection_id, tx }, rx)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Queue an event. Returns `false` if the connection is already gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// An authenticated connection as seen by the fan-out.
#[derive(Debug)]
pub struct Subscriber {
    /// Verified account user id.
    pub user_id: String,
    /// The client's document correlation token.
    pub mobwrite_id: String,
    handle: ClientHandle,
}

impl Subscriber {
    pub fn new(user_id: String, mobwrite_id: String, handle: ClientHandle) -> Self {
        Self {
            user_id,
            mobwrite_id,
            handle,
        }
    }

    pub fn connection_id(&self) -> &str {
        self.handle.connection_id()
    }

    pub fn send(&self, event: ServerEvent) -> bool {
        self.handle.send(event)
    }
}
