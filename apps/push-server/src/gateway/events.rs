//! Server → client events and client frame decoding.

use komob_common::protocol::{
    Frame, Reason, EVENT_AUTH, EVENT_ERROR, EVENT_FRIENDS, EVENT_MOBWRITE, EVENT_SESSIONS,
};
use komob_common::PushKind;
use serde_json::Value;

/// An event queued for delivery to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// `komob_auth(true)`
    AuthAccepted,
    /// `komob_auth(false, reason)`; the connection closes after it.
    AuthRejected(Reason),
    /// `komob_error(reason)`; the connection closes after it.
    Error(Reason),
    /// Refetch the friends list.
    Friends,
    /// Refetch the sessions list.
    Sessions,
    /// Pull the document now.
    Mobwrite,
}

impl ServerEvent {
    pub fn to_frame(&self) -> Frame {
        match self {
            ServerEvent::AuthAccepted => Frame::new(EVENT_AUTH, vec![Value::Bool(true)]),
            ServerEvent::AuthRejected(reason) => Frame::new(
                EVENT_AUTH,
                vec![Value::Bool(false), Value::String(reason.as_str().to_string())],
            ),
            ServerEvent::Error(reason) => {
                Frame::new(EVENT_ERROR, vec![Value::String(reason.as_str().to_string())])
            }
            ServerEvent::Friends => Frame::new(EVENT_FRIENDS, Vec::new()),
            ServerEvent::Sessions => Frame::new(EVENT_SESSIONS, Vec::new()),
            ServerEvent::Mobwrite => Frame::new(EVENT_MOBWRITE, Vec::new()),
        }
    }

    /// Whether the connection is aborted once this event is written.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::AuthRejected(_) | ServerEvent::Error(_))
    }
}

impl From<PushKind> for ServerEvent {
    fn from(kind: PushKind) -> Self {
        match kind {
            PushKind::Friends => ServerEvent::Friends,
            PushKind::Sessions => ServerEvent::Sessions,
            PushKind::Mobwrite => ServerEvent::Mobwrite,
        }
    }
}

/// A decoded client → server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// `komob_auth` with its raw payload (empty when the argument is missing).
    Auth(String),
    /// Any other event name; the server has no handler for these.
    Other(String),
}

impl ClientEvent {
    /// Decode a text frame. Returns `None` for frames that are not JSON events.
    pub fn parse(text: &str) -> Option<Self> {
        let frame: Frame = serde_json::from_str(text).ok()?;
        if frame.event == EVENT_AUTH {
            Some(ClientEvent::Auth(frame.text_arg().unwrap_or_default().to_string()))
        } else {
            Some(ClientEvent::Other(frame.event))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_frames_on_the_wire() {
        let ok = serde_json::to_value(ServerEvent::AuthAccepted.to_frame()).unwrap();
        assert_eq!(ok, serde_json::json!({ "event": "komob_auth", "args": [true] }));

        let rejected =
            serde_json::to_value(ServerEvent::AuthRejected(Reason::Version).to_frame()).unwrap();
        assert_eq!(
            rejected,
            serde_json::json!({ "event": "komob_auth", "args": [false, "version"] })
        );

        let error = serde_json::to_value(ServerEvent::Error(Reason::Invalid).to_frame()).unwrap();
        assert_eq!(error, serde_json::json!({ "event": "komob_error", "args": ["invalid"] }));
    }

    #[test]
    fn only_failures_are_terminal() {
        assert!(ServerEvent::AuthRejected(Reason::Credentials).is_terminal());
        assert!(ServerEvent::Error(Reason::Unavailable).is_terminal());
        assert!(!ServerEvent::AuthAccepted.is_terminal());
        assert!(!ServerEvent::Mobwrite.is_terminal());
    }

    #[test]
    fn push_kinds_map_to_notifications() {
        assert_eq!(ServerEvent::from(PushKind::Friends).to_frame().event, EVENT_FRIENDS);
        assert_eq!(ServerEvent::from(PushKind::Sessions).to_frame().event, EVENT_SESSIONS);
        assert_eq!(ServerEvent::from(PushKind::Mobwrite).to_frame().event, EVENT_MOBWRITE);
    }

    #[test]
    fn parses_client_frames() {
        let auth = ClientEvent::parse(r#"{"event":"komob_auth","args":["3\na\nb"]}"#);
        assert_eq!(auth, Some(ClientEvent::Auth("3\na\nb".to_string())));

        let no_arg = ClientEvent::parse(r#"{"event":"komob_auth"}"#);
        assert_eq!(no_arg, Some(ClientEvent::Auth(String::new())));

        let other = ClientEvent::parse(r#"{"event":"typing","args":[]}"#);
        assert_eq!(other, Some(ClientEvent::Other("typing".to_string())));

        assert_eq!(ClientEvent::parse("not json"), None);
    }
}
