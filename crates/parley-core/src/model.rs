//! Conversation data model.
//!
//! These are the view-model types the UI collaborator renders. They are
//! created from REST history or from inbound events and only ever mutated by
//! the [`crate::ConversationStore`] on behalf of the router.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use parley_proto::{ConversationPayload, MessagePayload, Timestamp};

/// Conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub u64);

/// Message identifier, stable across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

/// User identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author's user id.
    pub user_id: UserId,
    /// Author's username.
    pub username: String,
    /// Message text.
    pub content: String,
    /// When the message was first sent.
    pub sent_at: Timestamp,
    /// When the message was last edited. `None` if never edited.
    pub edited_at: Option<Timestamp>,
    /// Whether the message has been read.
    pub read: bool,
}

impl Message {
    /// Whether `username` authored this message.
    pub fn is_from(&self, username: &str) -> bool {
        self.username == username
    }
}

impl From<MessagePayload> for Message {
    fn from(p: MessagePayload) -> Self {
        Self {
            id: MessageId(p.id),
            conversation_id: ConversationId(p.conversation_id),
            user_id: UserId(p.user_id),
            username: p.username,
            content: p.content,
            sent_at: p.sent_at,
            edited_at: p.edited_at,
            read: p.read,
        }
    }
}

/// A named conversation and its messages in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Display name.
    pub name: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
    /// Messages in arrival order.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Stand-in for a conversation that produced events before its
    /// metadata was loaded. Named after its id until the REST collaborator
    /// supplies the real one.
    pub fn placeholder(id: ConversationId, at: Timestamp) -> Self {
        Self { id, name: format!("#{id}"), created_at: at, updated_at: at, messages: Vec::new() }
    }

    /// Index of a message by id.
    pub fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Message by id.
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Number of messages not yet read.
    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.read).count()
    }

    /// Latest message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl From<ConversationPayload> for Conversation {
    fn from(p: ConversationPayload) -> Self {
        Self {
            id: ConversationId(p.id),
            name: p.name,
            created_at: p.created_at,
            updated_at: p.updated_at,
            messages: p.messages.into_iter().map(Message::from).collect(),
        }
    }
}

/// Usernames currently typing, per conversation.
///
/// Conversations with nobody typing have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingState {
    typing: HashMap<ConversationId, BTreeSet<String>>,
}

impl TypingState {
    /// Mark `username` as typing. Returns `true` if the set changed.
    pub fn start(&mut self, conversation_id: ConversationId, username: &str) -> bool {
        self.typing.entry(conversation_id).or_default().insert(username.to_owned())
    }

    /// Mark `username` as no longer typing. Returns `true` if the set
    /// changed.
    pub fn stop(&mut self, conversation_id: ConversationId, username: &str) -> bool {
        let Some(users) = self.typing.get_mut(&conversation_id) else {
            return false;
        };
        let removed = users.remove(username);
        if users.is_empty() {
            self.typing.remove(&conversation_id);
        }
        removed
    }

    /// Usernames typing in a conversation, sorted.
    pub fn users(&self, conversation_id: ConversationId) -> Vec<String> {
        self.typing
            .get(&conversation_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether anyone is typing in a conversation.
    pub fn is_anyone_typing(&self, conversation_id: ConversationId) -> bool {
        self.typing.contains_key(&conversation_id)
    }

    /// Forget a conversation's typing set. Returns `true` if it was
    /// non-empty.
    pub fn clear(&mut self, conversation_id: ConversationId) -> bool {
        self.typing.remove(&conversation_id).is_some()
    }

    /// Keep only the conversations for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(ConversationId) -> bool) {
        self.typing.retain(|id, _| keep(*id));
    }

    /// Forget every typing set.
    pub fn clear_all(&mut self) {
        self.typing.clear();
    }
}
