//! Parley core
//!
//! Sans-IO state for the messaging client. Nothing in this crate performs
//! I/O, spawns tasks or reads a clock: callers feed inputs (frame bodies,
//! keystrokes, the current instant) and execute the returned actions.
//!
//! # Components
//!
//! - [`ConversationStore`]: conversations, their ordered messages, and who is
//!   typing where
//! - [`MessageEventRouter`]: decodes subscription payloads into
//!   [`InboundEvent`]s and applies them to the store
//! - [`SubscriptionRegistry`]: the single source of truth for live
//!   subscriptions, the active conversation and per-conversation typing timers
//! - [`TypingDebouncer`]: Idle/Announced state machine that coalesces
//!   keystrokes into typing signals

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod model;
mod registry;
mod router;
mod store;
mod typing;

pub use error::{DecodeError, RouteError};
pub use model::{Conversation, ConversationId, Message, MessageId, TypingState, UserId};
pub use parley_proto::Timestamp;
pub use registry::{
    Registered, Released, ScheduledTask, SubscriptionHandle, SubscriptionId, SubscriptionKey,
    SubscriptionRegistry, TopicKind,
};
pub use router::{InboundEvent, MessageEventRouter, Routed, StoreEvent};
pub use store::ConversationStore;
pub use typing::{DEFAULT_TYPING_WINDOW, TypingAction, TypingDebouncer, TypingSignal};
