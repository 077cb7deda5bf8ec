//! REST collaborator interface.
//!
//! Conversation directory and history live behind a plain request/response
//! API. The messenger only needs the operations below; [`crate::rest`]
//! provides the HTTP implementation.

use std::future::Future;

use parley_core::{Conversation, ConversationId};

use crate::error::ApiError;

/// Conversation CRUD and history.
pub trait ConversationApi: Send + Sync {
    /// Every conversation visible to the user. History may be omitted.
    fn list_conversations(&self) -> impl Future<Output = Result<Vec<Conversation>, ApiError>> + Send;

    /// One conversation including its history.
    fn get_conversation(&self, id: ConversationId) -> impl Future<Output = Result<Conversation, ApiError>> + Send;

    /// Create a conversation.
    fn create_conversation(&self, name: &str) -> impl Future<Output = Result<Conversation, ApiError>> + Send;

    /// Rename a conversation.
    fn rename_conversation(
        &self,
        id: ConversationId,
        name: &str,
    ) -> impl Future<Output = Result<Conversation, ApiError>> + Send;

    /// Delete a conversation.
    fn delete_conversation(&self, id: ConversationId) -> impl Future<Output = Result<(), ApiError>> + Send;
}
