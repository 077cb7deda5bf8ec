//! Client
//!
//! Async runtime for the Parley messaging client. Executes the Sans-IO
//! decisions of [`parley_core`] against a live broker: one STOMP session over
//! one channel, topic subscriptions, publishes and typing timers.
//!
//! # Components
//!
//! - [`Messenger`]: the connection context. Connect and disconnect,
//!   subscribe and switch conversations, publish commands, report keystrokes
//! - [`Connector`]: opens the duplex text channel the session runs over
//! - [`Subscription`]: stream of [`InboundEvent`]s for one topic
//! - [`ConversationApi`]: REST collaborator for the conversation directory
//! - [`TokenStore`]: source of the bearer token
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, [`WebSocketConnector`] connects to a
//! broker over WebSocket. With `rest`, [`rest::HttpConversationApi`] talks to
//! the conversation REST API over HTTP.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod api;
mod config;
mod connector;
mod error;
mod messenger;
mod subscription;
mod token;

#[cfg(feature = "rest")]
pub mod rest;
#[cfg(feature = "transport")]
mod transport;

pub use api::ConversationApi;
pub use config::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT, MessengerConfig};
pub use connector::{Channel, ConnectRequest, ConnectionState, Connector};
pub use error::{ApiError, ConnectError, OpenError, PublishError, SubscribeError, TransportError};
pub use messenger::{Messenger, MessengerEvent};
pub use parley_core::{
    Conversation, ConversationId, ConversationStore, InboundEvent, Message, MessageId, StoreEvent, SubscriptionHandle,
    SubscriptionKey, Timestamp, TopicKind, UserId,
};
pub use subscription::{ConversationView, Subscription};
pub use token::{FileTokenStore, StaticToken, TokenStore, token_subject};
#[cfg(feature = "transport")]
pub use transport::WebSocketConnector;
