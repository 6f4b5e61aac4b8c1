//! Event vocabulary spoken over the push socket.
//!
//! Every WebSocket text frame carries one JSON [`Frame`]: an event name plus a
//! positional argument list, the shape editor clients already emit and listen
//! for.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EVENT_AUTH: &str = "komob_auth";
pub const EVENT_ERROR: &str = "komob_error";
pub const EVENT_FRIENDS: &str = "komob_friends";
pub const EVENT_SESSIONS: &str = "komob_sessions";
pub const EVENT_MOBWRITE: &str = "komob_mobwrite";

/// Reason code sent with a failed `komob_auth` reply or a `komob_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reason {
    /// The auth message was not `version\nsessionToken\nmobwriteId`.
    Invalid,
    /// The client's protocol version is not supported.
    Version,
    /// The account backend rejected the session.
    Credentials,
    /// The session store or account backend could not be reached.
    Unavailable,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Invalid => "invalid",
            Reason::Version => "version",
            Reason::Credentials => "credentials",
            Reason::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event frame, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Frame {
    pub fn new(event: &str, args: Vec<Value>) -> Self {
        Self {
            event: event.to_string(),
            args,
        }
    }

    /// Build the client's `komob_auth` request.
    pub fn auth_request(version: &str, session_token: &str, mobwrite_id: &str) -> Self {
        let payload = format!("{version}\n{session_token}\n{mobwrite_id}");
        Self::new(EVENT_AUTH, vec![Value::String(payload)])
    }

    /// The first argument as a string, if there is one.
    pub fn text_arg(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }
}
