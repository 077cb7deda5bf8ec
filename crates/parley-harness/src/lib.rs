//! Simulation harness for Parley client testing.
//!
//! [`SimBroker`] stands in for the STOMP broker so the full [`Messenger`]
//! stack (handshake, subscriptions, routing, typing timers) runs in-process.
//! Combined with tokio's paused clock, timer behavior is deterministic: tests
//! move time with `tokio::time::advance` and call [`settle`] to let every
//! task react.
//!
//! [`Messenger`]: parley_client::Messenger

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod sim_broker;

use std::sync::Arc;

use parley_client::{Messenger, MessengerConfig, StaticToken};
use parley_proto::{MessagePayload, Timestamp};
pub use sim_broker::{BrokerMode, ECHO_USER_ID, SimBroker};

/// Yields granted to background tasks per [`settle`].
const SETTLE_YIELDS: usize = 64;

/// Let every runnable task make progress without moving the clock.
///
/// A frame needs a handful of hops (client queue, broker task, reader task),
/// each of which is one scheduling round on the current-thread runtime.
pub async fn settle() {
    for _ in 0..SETTLE_YIELDS {
        tokio::task::yield_now().await;
    }
}

/// Messenger wired to `broker` with a static token and default config.
pub fn messenger(broker: &SimBroker) -> Messenger<SimBroker> {
    messenger_with(broker, MessengerConfig::default())
}

/// Messenger wired to `broker` with `config`.
pub fn messenger_with(broker: &SimBroker, config: MessengerConfig) -> Messenger<SimBroker> {
    Messenger::new(broker.clone(), Arc::new(StaticToken::new("test-token")), config)
}

/// Message from another user, as the broker would serialize it.
pub fn message_payload(id: u64, conversation_id: u64, username: &str, content: &str) -> MessagePayload {
    MessagePayload {
        id,
        conversation_id,
        user_id: 100 + id,
        username: username.to_owned(),
        content: content.to_owned(),
        sent_at: Timestamp::new(chrono::Utc::now()),
        edited_at: None,
        read: false,
    }
}
