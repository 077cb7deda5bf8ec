//! Inbound event routing.
//!
//! Subscription frames arrive as raw JSON bodies tagged with the topic kind
//! they were delivered on. The router decodes them into [`InboundEvent`]s
//! and applies those to the [`ConversationStore`], reporting what changed as
//! [`StoreEvent`]s for the UI to observe.
//!
//! # Invariants
//!
//! - Arrival Order: new messages are appended in the order they are applied.
//! - Edit In Place: an edit replaces the message with the same id at the same
//!   index and never changes the sequence length.
//! - Non-Fatal: decode and routing failures are logged and the frame is
//!   discarded. [`MessageEventRouter::route`] never returns an error.

use parley_proto::{Envelope, EnvelopeKind, TypingPayload, payloads::decode_json};

use crate::{
    error::{DecodeError, RouteError},
    model::{ConversationId, Message, MessageId},
    registry::TopicKind,
    store::ConversationStore,
};

/// A decoded subscription payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A message was posted.
    NewMessage(Message),
    /// A message's content was replaced.
    MessageEdited(Message),
    /// Someone started typing.
    TypingStarted {
        /// Who.
        username: String,
    },
    /// Someone stopped typing.
    TypingStopped {
        /// Who.
        username: String,
    },
    /// An envelope type this client does not act on.
    Notice {
        /// Raw type tag.
        kind: String,
        /// Free-form text, if the envelope carried any.
        content: Option<String>,
    },
}

/// A change to the store the UI should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A message was appended (or a redelivery replaced its copy).
    MessageAppended {
        /// Conversation changed.
        conversation_id: ConversationId,
        /// Message appended.
        message_id: MessageId,
    },
    /// The UI should scroll the conversation to its newest message.
    ScrollToLatest {
        /// Conversation to scroll.
        conversation_id: ConversationId,
    },
    /// A message was replaced in place.
    MessageEdited {
        /// Conversation changed.
        conversation_id: ConversationId,
        /// Message replaced.
        message_id: MessageId,
        /// Its index in the conversation.
        position: usize,
    },
    /// The set of users typing in a conversation changed.
    TypingChanged {
        /// Conversation changed.
        conversation_id: ConversationId,
        /// Users now typing, sorted.
        users: Vec<String>,
    },
}

/// A frame that made it through decoding and routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    /// The decoded event.
    pub event: InboundEvent,
    /// Store changes it caused.
    pub changes: Vec<StoreEvent>,
}

/// Decodes subscription payloads and applies them to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageEventRouter;

impl MessageEventRouter {
    /// Decode a frame body delivered on a `kind` subscription.
    pub fn decode(kind: TopicKind, body: &str) -> Result<InboundEvent, DecodeError> {
        match kind {
            TopicKind::NewMessage => {
                let envelope: Envelope = decode_json(body)?;
                match envelope.kind() {
                    EnvelopeKind::NewMessage => Ok(InboundEvent::NewMessage(Self::message_of(envelope)?)),
                    EnvelopeKind::MessageEdited => Ok(InboundEvent::MessageEdited(Self::message_of(envelope)?)),
                    EnvelopeKind::Other(kind) => Ok(InboundEvent::Notice { kind, content: envelope.content }),
                }
            },
            TopicKind::Typing => {
                let payload: TypingPayload = decode_json(body)?;
                Ok(if payload.typing {
                    InboundEvent::TypingStarted { username: payload.username }
                } else {
                    InboundEvent::TypingStopped { username: payload.username }
                })
            },
        }
    }

    /// Apply an event delivered on a subscription for `conversation_id`.
    ///
    /// A message whose `conversation_id` disagrees with the subscription's
    /// is rejected without touching the store.
    pub fn apply(
        store: &mut ConversationStore,
        conversation_id: ConversationId,
        event: &InboundEvent,
    ) -> Result<Vec<StoreEvent>, RouteError> {
        match event {
            InboundEvent::NewMessage(message) => {
                if message.conversation_id != conversation_id {
                    return Err(RouteError::Misrouted {
                        subscribed: conversation_id,
                        carried: message.conversation_id,
                    });
                }
                store.append(message.clone());
                Ok(vec![
                    StoreEvent::MessageAppended { conversation_id, message_id: message.id },
                    StoreEvent::ScrollToLatest { conversation_id },
                ])
            },
            InboundEvent::MessageEdited(message) => {
                if message.conversation_id != conversation_id {
                    return Err(RouteError::UnknownMessage { conversation_id, message_id: message.id });
                }
                let position = store.replace(message.clone())?;
                Ok(vec![StoreEvent::MessageEdited { conversation_id, message_id: message.id, position }])
            },
            InboundEvent::TypingStarted { username } => {
                let changed = store.typing_mut().start(conversation_id, username);
                Ok(Self::typing_changed(store, conversation_id, changed))
            },
            InboundEvent::TypingStopped { username } => {
                let changed = store.typing_mut().stop(conversation_id, username);
                Ok(Self::typing_changed(store, conversation_id, changed))
            },
            InboundEvent::Notice { .. } => Ok(Vec::new()),
        }
    }

    /// Decode and apply one frame body, logging and discarding failures.
    pub fn route(
        store: &mut ConversationStore,
        conversation_id: ConversationId,
        kind: TopicKind,
        body: &str,
    ) -> Option<Routed> {
        let event = match Self::decode(kind, body) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(%conversation_id, %kind, %error, "discarding undecodable frame");
                return None;
            },
        };

        if let InboundEvent::Notice { kind: tag, content } = &event {
            tracing::debug!(%conversation_id, %tag, ?content, "notice");
        }

        match Self::apply(store, conversation_id, &event) {
            Ok(changes) => Some(Routed { event, changes }),
            Err(error) => {
                tracing::warn!(%conversation_id, %error, "dropping event");
                None
            },
        }
    }

    fn message_of(envelope: Envelope) -> Result<Message, DecodeError> {
        envelope.message.map(Message::from).ok_or(DecodeError::MissingMessage { kind: envelope.kind })
    }

    fn typing_changed(store: &ConversationStore, conversation_id: ConversationId, changed: bool) -> Vec<StoreEvent> {
        if changed {
            vec![StoreEvent::TypingChanged { conversation_id, users: store.typing_users(conversation_id) }]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONV: ConversationId = ConversationId(42);

    fn envelope(tag: &str, id: u64, content: &str) -> String {
        format!(
            r#"{{"type":"{tag}","message":{{"id":{id},"conversationId":42,"userId":3,
            "username":"ana","content":"{content}","sentAt":"2024-05-01T10:00:00Z"}}}}"#
        )
    }

    fn contents(store: &ConversationStore) -> Vec<(u64, String)> {
        store
            .get(CONV)
            .map(|c| c.messages.iter().map(|m| (m.id.0, m.content.clone())).collect())
            .unwrap_or_default()
    }

    #[test]
    fn new_message_appends_and_scrolls() {
        let mut store = ConversationStore::new();

        let routed =
            MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, &envelope("NEW_MESSAGE", 7, "hi"))
                .unwrap();

        assert_eq!(routed.changes, vec![
            StoreEvent::MessageAppended { conversation_id: CONV, message_id: MessageId(7) },
            StoreEvent::ScrollToLatest { conversation_id: CONV },
        ]);
        assert_eq!(contents(&store), vec![(7, "hi".to_owned())]);
    }

    #[test]
    fn edit_replaces_in_place() {
        let mut store = ConversationStore::new();
        MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, &envelope("NEW_MESSAGE", 7, "hi"));

        let routed = MessageEventRouter::route(
            &mut store,
            CONV,
            TopicKind::NewMessage,
            &envelope("MESSAGE_EDITED", 7, "hi there"),
        )
        .unwrap();

        assert_eq!(routed.changes, vec![StoreEvent::MessageEdited {
            conversation_id: CONV,
            message_id: MessageId(7),
            position: 0,
        }]);
        assert_eq!(contents(&store), vec![(7, "hi there".to_owned())]);
    }

    #[test]
    fn edit_of_unknown_message_is_dropped() {
        let mut store = ConversationStore::new();
        MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, &envelope("NEW_MESSAGE", 7, "hi"));

        let routed =
            MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, &envelope("MESSAGE_EDITED", 8, "x"));

        assert!(routed.is_none());
        assert_eq!(contents(&store), vec![(7, "hi".to_owned())]);
    }

    #[test]
    fn legacy_tags_route_like_canonical_ones() {
        let mut store = ConversationStore::new();
        MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, &envelope("NUEVO_MENSAJE", 7, "hola"));
        MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, &envelope("MENSAJE_EDITADO", 7, "adios"));

        assert_eq!(contents(&store), vec![(7, "adios".to_owned())]);
    }

    #[test]
    fn misrouted_message_is_rejected() {
        let mut store = ConversationStore::new();
        let event = MessageEventRouter::decode(TopicKind::NewMessage, &envelope("NEW_MESSAGE", 7, "hi")).unwrap();

        let result = MessageEventRouter::apply(&mut store, ConversationId(43), &event);

        assert_eq!(result, Err(RouteError::Misrouted { subscribed: ConversationId(43), carried: CONV }));
        assert!(store.get(ConversationId(43)).is_none());
        assert!(store.get(CONV).is_none());
    }

    #[test]
    fn message_bearing_tag_without_message_is_decode_error() {
        let result = MessageEventRouter::decode(TopicKind::NewMessage, r#"{"type":"NEW_MESSAGE"}"#);
        assert_eq!(result, Err(DecodeError::MissingMessage { kind: "NEW_MESSAGE".to_owned() }));
    }

    #[test]
    fn malformed_body_is_discarded() {
        let mut store = ConversationStore::new();
        assert!(MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, "{not json").is_none());
        assert!(MessageEventRouter::route(&mut store, CONV, TopicKind::Typing, r#"{"usuario":1}"#).is_none());
    }

    #[test]
    fn unknown_tag_is_a_notice() {
        let mut store = ConversationStore::new();

        let routed =
            MessageEventRouter::route(&mut store, CONV, TopicKind::NewMessage, r#"{"type":"SYSTEM","content":"hi"}"#)
                .unwrap();

        assert_eq!(routed.event, InboundEvent::Notice { kind: "SYSTEM".to_owned(), content: Some("hi".to_owned()) });
        assert!(routed.changes.is_empty());
    }

    #[test]
    fn typing_events_update_sets_only_on_change() {
        let mut store = ConversationStore::new();
        let start = r#"{"usuario":"bo","escribiendo":true}"#;
        let stop = r#"{"usuario":"bo","escribiendo":false}"#;

        let first = MessageEventRouter::route(&mut store, CONV, TopicKind::Typing, start).unwrap();
        let repeat = MessageEventRouter::route(&mut store, CONV, TopicKind::Typing, start).unwrap();

        assert_eq!(first.changes, vec![StoreEvent::TypingChanged {
            conversation_id: CONV,
            users: vec!["bo".to_owned()]
        }]);
        assert!(repeat.changes.is_empty());

        let stopped = MessageEventRouter::route(&mut store, CONV, TopicKind::Typing, stop).unwrap();
        assert_eq!(stopped.changes, vec![StoreEvent::TypingChanged { conversation_id: CONV, users: vec![] }]);
        assert!(store.typing_users(CONV).is_empty());
    }
}
