//! Conversation store.
//!
//! Holds every conversation the client knows about, keyed by id, and the
//! typing sets. Directory operations (load, rename, remove) come from the
//! REST collaborator; message mutations only come from the router.

use std::collections::BTreeMap;

use crate::{
    error::RouteError,
    model::{Conversation, ConversationId, Message, TypingState},
};

/// Conversations and typing state.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: BTreeMap<ConversationId, Conversation>,
    typing: TypingState,
}

impl ConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole directory with a freshly fetched list.
    ///
    /// Typing sets of conversations that disappear are dropped.
    pub fn load_conversations(&mut self, conversations: impl IntoIterator<Item = Conversation>) {
        self.conversations = conversations.into_iter().map(|c| (c.id, c)).collect();
        let known = &self.conversations;
        self.typing.retain(|id| known.contains_key(&id));
    }

    /// Insert or replace one conversation, e.g. after fetching its history.
    pub fn load_conversation(&mut self, conversation: Conversation) {
        self.conversations.insert(conversation.id, conversation);
    }

    /// Forget a conversation and its typing set.
    pub fn remove_conversation(&mut self, id: ConversationId) -> Option<Conversation> {
        self.typing.clear(id);
        self.conversations.remove(&id)
    }

    /// Rename a conversation.
    pub fn rename_conversation(&mut self, id: ConversationId, name: impl Into<String>) -> Result<(), RouteError> {
        let conversation = self.conversations.get_mut(&id).ok_or(RouteError::UnknownConversation(id))?;
        conversation.name = name.into();
        Ok(())
    }

    /// Conversation by id.
    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    /// Whether a conversation is known.
    pub fn contains(&self, id: ConversationId) -> bool {
        self.conversations.contains_key(&id)
    }

    /// All conversations, ordered by id.
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    /// Conversations whose name contains `needle`, ignoring case.
    pub fn filter_by_name<'a>(&'a self, needle: &str) -> impl Iterator<Item = &'a Conversation> + 'a {
        let needle = needle.to_lowercase();
        self.conversations.values().filter(move |c| c.name.to_lowercase().contains(&needle))
    }

    /// Unread messages in one conversation. Zero for unknown ids.
    pub fn unread_count(&self, id: ConversationId) -> usize {
        self.get(id).map_or(0, Conversation::unread_count)
    }

    /// Unread messages across all conversations.
    pub fn total_unread(&self) -> usize {
        self.conversations.values().map(Conversation::unread_count).sum()
    }

    /// Typing sets.
    pub fn typing(&self) -> &TypingState {
        &self.typing
    }

    /// Usernames typing in a conversation, sorted.
    pub fn typing_users(&self, id: ConversationId) -> Vec<String> {
        self.typing.users(id)
    }

    /// Forget a conversation's typing set. Returns `true` if it changed.
    pub fn clear_typing(&mut self, id: ConversationId) -> bool {
        self.typing.clear(id)
    }

    /// Forget every typing set.
    pub fn clear_all_typing(&mut self) {
        self.typing.clear_all();
    }

    pub(crate) fn typing_mut(&mut self) -> &mut TypingState {
        &mut self.typing
    }

    /// Append a message, creating a placeholder conversation if needed.
    ///
    /// A message whose id is already present replaces it in place instead,
    /// so a redelivered event never duplicates. Returns the message index.
    pub(crate) fn append(&mut self, message: Message) -> usize {
        let conversation = self
            .conversations
            .entry(message.conversation_id)
            .or_insert_with(|| Conversation::placeholder(message.conversation_id, message.sent_at));

        conversation.updated_at = conversation.updated_at.max(message.sent_at);
        if let Some(index) = conversation.position(message.id) {
            conversation.messages[index] = message;
            return index;
        }
        conversation.messages.push(message);
        conversation.messages.len() - 1
    }

    /// Replace a message in place. Returns its index.
    pub(crate) fn replace(&mut self, message: Message) -> Result<usize, RouteError> {
        let conversation_id = message.conversation_id;
        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(RouteError::UnknownConversation(conversation_id))?;
        let index = conversation
            .position(message.id)
            .ok_or(RouteError::UnknownMessage { conversation_id, message_id: message.id })?;

        if let Some(edited_at) = message.edited_at {
            conversation.updated_at = conversation.updated_at.max(edited_at);
        }
        conversation.messages[index] = message;
        Ok(index)
    }
}
