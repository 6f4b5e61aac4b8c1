//! Broker channel naming: `<prefix>:<kind>:<userId>`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Separator between channel name segments.
pub const DELIMITER: char = ':';

/// The closed set of push message kinds published on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    Friends,
    Sessions,
    Mobwrite,
}

impl PushKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushKind::Friends => "friends",
            PushKind::Sessions => "sessions",
            PushKind::Mobwrite => "mobwrite",
        }
    }
}

impl fmt::Display for PushKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friends" => Ok(PushKind::Friends),
            "sessions" => Ok(PushKind::Sessions),
            "mobwrite" => Ok(PushKind::Mobwrite),
            other => Err(ChannelError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("malformed channel name `{0}`")]
    Malformed(String),
    #[error("unknown message type `{0}`")]
    UnknownKind(String),
}

/// A decoded broker channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushChannel {
    pub kind: PushKind,
    pub user_id: String,
}

impl PushChannel {
    pub fn new(kind: PushKind, user_id: impl Into<String>) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
        }
    }

    /// Pattern matching every push channel under `prefix`.
    pub fn pattern(prefix: &str) -> String {
        format!("{prefix}{DELIMITER}*")
    }

    /// Channel name a publisher uses for this kind and user.
    pub fn name(&self, prefix: &str) -> String {
        format!("{prefix}{DELIMITER}{}{DELIMITER}{}", self.kind, self.user_id)
    }

    /// Decode `<prefix>:<kind>:<userId>`.
    ///
    /// Everything after the second delimiter is the user id, so ids that
    /// themselves contain `:` survive intact.
    pub fn parse(prefix: &str, channel: &str) -> Result<Self, ChannelError> {
        let malformed = || ChannelError::Malformed(channel.to_string());

        let mut parts = channel.splitn(3, DELIMITER);
        let head = parts.next().ok_or_else(malformed)?;
        if head != prefix {
            return Err(malformed());
        }
        let kind = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        let user_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;

        Ok(Self {
            kind: kind.parse()?,
            user_id: user_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "komob-push";

    #[test]
    fn parses_well_formed_channel() {
        let ch = PushChannel::parse(PREFIX, "komob-push:mobwrite:u42").unwrap();
        assert_eq!(ch, PushChannel::new(PushKind::Mobwrite, "u42"));
    }

    #[test]
    fn name_and_parse_agree() {
        let ch = PushChannel::new(PushKind::Friends, "u42");
        assert_eq!(ch.name(PREFIX), "komob-push:friends:u42");
        assert_eq!(PushChannel::parse(PREFIX, &ch.name(PREFIX)).unwrap(), ch);
    }

    #[test]
    fn missing_user_segment_is_malformed() {
        let err = PushChannel::parse(PREFIX, "komob-push:mobwrite").unwrap_err();
        assert!(matches!(err, ChannelError::Malformed(_)));

        let err = PushChannel::parse(PREFIX, "komob-push:mobwrite:").unwrap_err();
        assert!(matches!(err, ChannelError::Malformed(_)));
    }

    #[test]
    fn missing_kind_segment_is_malformed() {
        let err = PushChannel::parse(PREFIX, "komob-push::u42").unwrap_err();
        assert!(matches!(err, ChannelError::Malformed(_)));

        let err = PushChannel::parse(PREFIX, "komob-push").unwrap_err();
        assert!(matches!(err, ChannelError::Malformed(_)));
    }

    #[test]
    fn foreign_prefix_is_malformed() {
        let err = PushChannel::parse(PREFIX, "other:friends:u42").unwrap_err();
        assert!(matches!(err, ChannelError::Malformed(_)));
    }

    #[test]
    fn unknown_kind_is_reported() {
        let err = PushChannel::parse(PREFIX, "komob-push:avatars:u42").unwrap_err();
        assert_eq!(err, ChannelError::UnknownKind("avatars".to_string()));
    }

    #[test]
    fn user_id_keeps_embedded_delimiters() {
        let ch = PushChannel::parse(PREFIX, "komob-push:sessions:team:7").unwrap();
        assert_eq!(ch.user_id, "team:7");
    }

    #[test]
    fn pattern_covers_prefix() {
        assert_eq!(PushChannel::pattern(PREFIX), "komob-push:*");
    }
}
