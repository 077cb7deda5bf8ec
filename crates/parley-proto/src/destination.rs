//! Destination naming.
//!
//! Topics (`/topic/...`) are broker-to-client fan-out; application
//! destinations (`/app/...`) are client-to-broker commands. Conversation ids
//! appear as decimal path segments.

use std::fmt;

/// Prefix of every conversation topic.
const TOPIC_PREFIX: &str = "/topic/conversation/";

/// Prefix of every client command destination.
const APP_PREFIX: &str = "/app/chat/";

/// Command addressed to a conversation under `/app/chat/{id}/...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppCommand {
    /// Post a new message.
    Send,
    /// Replace a message's content.
    Edit,
    /// Announce that the local user is typing.
    Typing,
    /// Announce that the local user stopped typing.
    StopTyping,
    /// Mark a message as read.
    MarkRead,
}

impl AppCommand {
    /// Trailing path segment of the command destination.
    pub fn segment(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Edit => "edit",
            Self::Typing => "typing",
            Self::StopTyping => "stop-typing",
            Self::MarkRead => "mark-read",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        Some(match segment {
            "send" => Self::Send,
            "edit" => Self::Edit,
            "typing" => Self::Typing,
            "stop-typing" => Self::StopTyping,
            "mark-read" => Self::MarkRead,
            _ => return None,
        })
    }
}

/// Parsed destination string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// `/topic/conversation/{id}`: new and edited messages.
    MessageTopic(u64),
    /// `/topic/conversation/{id}/typing`: typing presence.
    TypingTopic(u64),
    /// `/app/chat/{id}/{command}`: client command.
    App(u64, AppCommand),
}

impl Destination {
    /// Parse a destination string. `None` for anything outside the
    /// conversation namespace.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(rest) = raw.strip_prefix(TOPIC_PREFIX) {
            return match rest.split_once('/') {
                None => rest.parse().ok().map(Self::MessageTopic),
                Some((id, "typing")) => id.parse().ok().map(Self::TypingTopic),
                Some(_) => None,
            };
        }

        let rest = raw.strip_prefix(APP_PREFIX)?;
        let (id, segment) = rest.split_once('/')?;
        Some(Self::App(id.parse().ok()?, AppCommand::from_segment(segment)?))
    }

    /// Conversation the destination belongs to.
    pub fn conversation_id(self) -> u64 {
        match self {
            Self::MessageTopic(id) | Self::TypingTopic(id) | Self::App(id, _) => id,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageTopic(id) => write!(f, "{TOPIC_PREFIX}{id}"),
            Self::TypingTopic(id) => write!(f, "{TOPIC_PREFIX}{id}/typing"),
            Self::App(id, command) => write!(f, "{APP_PREFIX}{id}/{}", command.segment()),
        }
    }
}
