//! Client error types.
//!
//! Connection failures surface through [`ConnectError`] and the connection
//! state stream. Per-operation failures come back from the call that caused
//! them. None of these are fatal to the process.

use std::time::Duration;

use parley_proto::ProtocolError;
use thiserror::Error;

/// Channel-level failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel could not be opened.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The channel closed underneath us.
    #[error("transport closed")]
    Closed,

    /// The peer sent something that is not a STOMP frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Why [`crate::Messenger::connect`] failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The broker did not answer `CONNECT` in time.
    #[error("broker did not confirm the connection within {after:?}")]
    Timeout {
        /// The configured bound.
        after: Duration,
    },

    /// The broker answered `CONNECT` with `ERROR`.
    #[error("broker rejected the connection: {message}")]
    Rejected {
        /// The broker's `message` header, or the body if absent.
        message: String,
    },

    /// The channel failed during the handshake.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Why a publish failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// No channel is established.
    #[error("not connected")]
    NotConnected,

    /// Message content is empty or whitespace.
    #[error("message content is empty")]
    EmptyContent,

    /// The outbound queue is full.
    #[error("outbound queue is full")]
    Backpressure,

    /// The channel closed before the frame could be queued.
    #[error("transport closed")]
    TransportClosed,

    /// The payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] ProtocolError),
}

/// Why a subscription could not be created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// No channel is established.
    #[error("not connected")]
    NotConnected,

    /// The `SUBSCRIBE` frame could not be queued.
    #[error("failed to send SUBSCRIBE: {0}")]
    Send(#[source] PublishError),
}

/// REST collaborator failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Http {
        /// Status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// The response body was not the expected JSON.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request could not be sent.
    #[error("request failed: {0}")]
    Transport(String),
}

/// Why [`crate::Messenger::open_conversation_with_history`] failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// History could not be fetched.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Subscriptions could not be created.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),
}
