//! Payloads the client publishes to `/app/chat/{id}/...`.
//!
//! Typing and stop-typing commands have empty bodies, and mark-read carries
//! the bare message id, so only send and edit need a struct.

use serde::{Deserialize, Serialize};

/// Body of `/app/chat/{id}/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    /// Target conversation (repeated from the destination).
    pub conversation_id: u64,
    /// Message text.
    pub content: String,
}

/// Body of `/app/chat/{id}/edit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPayload {
    /// Message being edited.
    #[serde(rename = "mensajeId")]
    pub message_id: u64,
    /// Replacement text.
    #[serde(rename = "contenido")]
    pub content: String,
}
