//! Channel abstraction.
//!
//! A [`Connector`] opens one duplex text channel to the broker. The
//! [`crate::Messenger`] speaks STOMP over it and never sees the underlying
//! socket, so the same orchestration runs against a real WebSocket and the
//! in-process simulated broker.

use std::{fmt, future::Future};

use tokio::sync::mpsc;

use crate::error::TransportError;

/// Connection lifecycle as observed by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No channel.
    #[default]
    Disconnected,
    /// Channel opening or waiting for `CONNECTED`.
    Connecting,
    /// Handshake complete; subscribe and publish are available.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Parameters for opening a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Bearer token, sent with the upgrade request where the transport has
    /// one.
    pub token: Option<String>,
    /// Capacity of the outbound queue the connector creates.
    pub outbound_capacity: usize,
}

/// An open duplex text channel.
///
/// Each item is one whole WebSocket text message. Dropping `outbound` asks
/// the connector to close the channel gracefully; `inbound` yields `None`
/// once the peer side is gone.
#[derive(Debug)]
pub struct Channel {
    /// Messages to the broker.
    pub outbound: mpsc::Sender<String>,
    /// Messages from the broker.
    pub inbound: mpsc::Receiver<String>,
}

impl Channel {
    /// Bundle the two halves.
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens channels to a broker.
pub trait Connector: Send + Sync + 'static {
    /// Open a new channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the broker cannot be reached.
    fn open(&self, request: &ConnectRequest) -> impl Future<Output = Result<Channel, TransportError>> + Send;
}
