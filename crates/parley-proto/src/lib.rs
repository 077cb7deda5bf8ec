//! Parley wire protocol.
//!
//! The broker speaks STOMP 1.2 over a single WebSocket. Every WebSocket text
//! message carries one STOMP [`Frame`] (or a bare end-of-line heart-beat).
//! Frames are addressed to destination strings built by the [`destination`]
//! module, and their bodies are UTF-8 JSON described by [`payloads`].
//!
//! This crate is pure data and codec: no I/O, no async, no state.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod destination;
pub mod errors;
mod frame;
pub mod payloads;

pub use destination::{AppCommand, Destination};
pub use errors::{ProtocolError, Result};
pub use frame::{Command, Frame, STOMP_VERSION};
pub use payloads::{
    ConversationPayload, EditPayload, Envelope, EnvelopeKind, MessagePayload, SendPayload,
    Timestamp, TypingPayload,
};
