//! Error types for routing inbound events.

use parley_proto::ProtocolError;
use thiserror::Error;

use crate::model::{ConversationId, MessageId};

/// A subscription payload that cannot be interpreted.
///
/// Never fatal: the router logs it and the frame is discarded while the
/// subscription stays alive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Body is not the JSON shape the topic carries.
    #[error("malformed payload: {0}")]
    Payload(#[from] ProtocolError),

    /// A message-bearing envelope arrived without its message.
    #[error("{kind} envelope has no message")]
    MissingMessage {
        /// Envelope type tag.
        kind: String,
    },
}

/// An inbound event that refers to state the store does not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Conversation was never loaded or has been removed.
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),

    /// No message with this id exists in the conversation.
    #[error("unknown message {message_id} in conversation {conversation_id}")]
    UnknownMessage {
        /// Conversation that was searched.
        conversation_id: ConversationId,
        /// Message id that was not found.
        message_id: MessageId,
    },

    /// A message arrived on another conversation's subscription.
    #[error("message for conversation {carried} delivered on conversation {subscribed}")]
    Misrouted {
        /// Conversation of the subscription it arrived on.
        subscribed: ConversationId,
        /// Conversation the message names.
        carried: ConversationId,
    },
}
