//! Payloads the broker delivers to subscriptions and the REST collaborator
//! returns.

use serde::{Deserialize, Deserializer, Serialize};

use super::Timestamp;

/// A chat message as the broker serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Message id, stable across edits.
    pub id: u64,
    /// Owning conversation.
    #[serde(alias = "conversacionId")]
    pub conversation_id: u64,
    /// Author's user id.
    pub user_id: u64,
    /// Author's username.
    pub username: String,
    /// Message text.
    #[serde(alias = "contenido")]
    pub content: String,
    /// When the message was first sent.
    #[serde(alias = "fechaEnvio")]
    pub sent_at: Timestamp,
    /// When the message was last edited.
    #[serde(default, alias = "fechaEdicion", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    /// Whether the message has been read.
    #[serde(default, alias = "leido")]
    pub read: bool,
}

/// A conversation with its history, as the REST collaborator returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    /// Conversation id.
    pub id: u64,
    /// Display name.
    #[serde(alias = "nombre")]
    pub name: String,
    /// Creation time.
    #[serde(alias = "fechaCreacion")]
    pub created_at: Timestamp,
    /// Last modification time.
    #[serde(alias = "fechaActualizacion")]
    pub updated_at: Timestamp,
    /// History in send order. `null` and absent both decode as empty.
    #[serde(default, alias = "mensajes", deserialize_with = "null_as_empty")]
    pub messages: Vec<MessagePayload>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Interpretation of an [`Envelope`] type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// A message was posted.
    NewMessage,
    /// A message's content was replaced.
    MessageEdited,
    /// Any tag this client does not act on.
    Other(String),
}

impl EnvelopeKind {
    /// Canonical tag for [`EnvelopeKind::NewMessage`].
    pub const NEW_MESSAGE: &'static str = "NEW_MESSAGE";
    /// Canonical tag for [`EnvelopeKind::MessageEdited`].
    pub const MESSAGE_EDITED: &'static str = "MESSAGE_EDITED";

    /// Classify a type tag. Legacy Spanish tags map to the same kinds.
    pub fn parse(tag: &str) -> Self {
        match tag {
            Self::NEW_MESSAGE | "NUEVO_MENSAJE" => Self::NewMessage,
            Self::MESSAGE_EDITED | "MENSAJE_EDITADO" => Self::MessageEdited,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Canonical wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewMessage => Self::NEW_MESSAGE,
            Self::MessageEdited => Self::MESSAGE_EDITED,
            Self::Other(tag) => tag,
        }
    }
}

/// Envelope delivered on `/topic/conversation/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Raw type tag. See [`Envelope::kind`].
    #[serde(rename = "type", alias = "tipo")]
    pub kind: String,
    /// Message the event refers to.
    #[serde(default, alias = "mensaje", skip_serializing_if = "Option::is_none")]
    pub message: Option<MessagePayload>,
    /// Free-form text for non-message notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Broker-side event time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl Envelope {
    /// Envelope announcing a new message.
    pub fn new_message(message: MessagePayload) -> Self {
        Self::with_message(EnvelopeKind::NewMessage, message)
    }

    /// Envelope announcing an edited message.
    pub fn message_edited(message: MessagePayload) -> Self {
        Self::with_message(EnvelopeKind::MessageEdited, message)
    }

    fn with_message(kind: EnvelopeKind, message: MessagePayload) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            timestamp: Some(message.edited_at.unwrap_or(message.sent_at)),
            message: Some(message),
            content: None,
        }
    }

    /// Classified type tag.
    pub fn kind(&self) -> EnvelopeKind {
        EnvelopeKind::parse(&self.kind)
    }
}

/// Payload delivered on `/topic/conversation/{id}/typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    /// Username whose typing state changed.
    #[serde(rename = "usuario")]
    pub username: String,
    /// `true` when typing started, `false` when it stopped.
    #[serde(rename = "escribiendo")]
    pub typing: bool,
}
