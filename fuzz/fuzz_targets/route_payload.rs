//! Fuzz target for MessageEventRouter::route
//!
//! Feeds arbitrary bodies on both topic kinds into one store.
//!
//! # Invariants
//!
//! - Routing never panics
//! - Message ids stay unique within a conversation
//! - Rejected events leave the store untouched

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{ConversationId, ConversationStore, MessageEventRouter, TopicKind};

#[derive(Debug, Arbitrary)]
struct Delivery {
    conversation: u8,
    typing: bool,
    body: String,
}

fuzz_target!(|deliveries: Vec<Delivery>| {
    let mut store = ConversationStore::new();

    for delivery in deliveries {
        let conversation_id = ConversationId(u64::from(delivery.conversation % 4));
        let kind = if delivery.typing { TopicKind::Typing } else { TopicKind::NewMessage };
        let before = store.get(conversation_id).map(|c| c.messages.clone());

        let routed = MessageEventRouter::route(&mut store, conversation_id, kind, &delivery.body);

        if routed.is_none() {
            assert_eq!(store.get(conversation_id).map(|c| c.messages.clone()), before, "rejected event mutated store");
        }
        if let Some(conversation) = store.get(conversation_id) {
            let ids: HashSet<_> = conversation.messages.iter().map(|m| m.id).collect();
            assert_eq!(ids.len(), conversation.messages.len(), "duplicate message id");
            assert!(conversation.messages.iter().all(|m| m.conversation_id == conversation_id));
        }
    }
});
