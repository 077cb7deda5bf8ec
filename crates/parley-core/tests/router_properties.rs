//! Property-based tests for routing inbound events into the store.
//!
//! A plain `Vec` of `(id, content)` pairs is the oracle: appends push, edits
//! of known ids overwrite in place, everything else leaves it unchanged.

use parley_core::{
    ConversationId, ConversationStore, InboundEvent, Message, MessageEventRouter, MessageId, StoreEvent,
    Timestamp, UserId,
};
use proptest::prelude::*;

const CONV: ConversationId = ConversationId(42);

#[derive(Debug, Clone)]
enum Op {
    Post { id: u64, content: String },
    Edit { id: u64, content: String },
    Typing { username: String, started: bool },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u64..16, "[a-z ]{0,12}").prop_map(|(id, content)| Op::Post { id, content }),
        3 => (0u64..16, "[a-z ]{0,12}").prop_map(|(id, content)| Op::Edit { id, content }),
        2 => ("(ana|bo|cy)", any::<bool>()).prop_map(|(username, started)| Op::Typing { username, started }),
    ]
}

fn message(id: u64, content: &str) -> Message {
    Message {
        id: MessageId(id),
        conversation_id: CONV,
        user_id: UserId(1),
        username: "ana".to_owned(),
        content: content.to_owned(),
        sent_at: Timestamp::parse("2024-05-01T10:00:00Z").unwrap(),
        edited_at: None,
        read: false,
    }
}

fn snapshot(store: &ConversationStore) -> Vec<(u64, String)> {
    store
        .get(CONV)
        .map(|c| c.messages.iter().map(|m| (m.id.0, m.content.clone())).collect())
        .unwrap_or_default()
}

proptest! {
    #[test]
    fn prop_store_matches_sequence_oracle(ops in prop::collection::vec(op_strategy(), 0..80)) {
        let mut store = ConversationStore::new();
        let mut oracle: Vec<(u64, String)> = Vec::new();

        for op in ops {
            let event = match &op {
                Op::Post { id, content } => InboundEvent::NewMessage(message(*id, content)),
                Op::Edit { id, content } => InboundEvent::MessageEdited(message(*id, content)),
                Op::Typing { username, started: true } => InboundEvent::TypingStarted { username: username.clone() },
                Op::Typing { username, started: false } => InboundEvent::TypingStopped { username: username.clone() },
            };
            let result = MessageEventRouter::apply(&mut store, CONV, &event);

            match op {
                Op::Post { id, content } => {
                    // Oracle: a redelivered id overwrites, a fresh one appends
                    match oracle.iter().position(|(known, _)| *known == id) {
                        Some(index) => oracle[index].1 = content,
                        None => oracle.push((id, content)),
                    }
                    prop_assert!(result.is_ok());
                },
                Op::Edit { id, content } => {
                    match oracle.iter().position(|(known, _)| *known == id) {
                        Some(index) => {
                            oracle[index].1 = content;
                            prop_assert_eq!(result, Ok(vec![StoreEvent::MessageEdited {
                                conversation_id: CONV,
                                message_id: MessageId(id),
                                position: index,
                            }]));
                        },
                        None => prop_assert!(result.is_err()),
                    }
                },
                Op::Typing { .. } => prop_assert!(result.is_ok()),
            }

            // PROPERTY: order, positions and length follow the oracle exactly
            prop_assert_eq!(snapshot(&store), oracle.clone());
        }
    }

    #[test]
    fn prop_distinct_posts_keep_arrival_order(count in 1usize..64) {
        let mut store = ConversationStore::new();
        for id in 0..count as u64 {
            MessageEventRouter::apply(&mut store, CONV, &InboundEvent::NewMessage(message(id, "x"))).unwrap();
        }

        // PROPERTY: messages come out in the order they were applied
        let ids: Vec<u64> = snapshot(&store).into_iter().map(|(id, _)| id).collect();
        prop_assert_eq!(ids, (0..count as u64).collect::<Vec<_>>());
    }

    #[test]
    fn prop_router_survives_arbitrary_bodies(body in ".{0,128}") {
        let mut store = ConversationStore::new();
        for kind in parley_core::TopicKind::ALL {
            let _ = MessageEventRouter::route(&mut store, CONV, kind, &body);
        }
    }
}

#[test]
fn edit_scenario_from_conversation_42() {
    let mut store = ConversationStore::new();
    MessageEventRouter::apply(&mut store, CONV, &InboundEvent::NewMessage(message(7, "hi"))).unwrap();

    MessageEventRouter::apply(&mut store, CONV, &InboundEvent::MessageEdited(message(7, "hi there"))).unwrap();

    assert_eq!(snapshot(&store), vec![(7, "hi there".to_owned())]);
}
