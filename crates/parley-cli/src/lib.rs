//! Parley terminal client.
//!
//! A line-oriented front end over [`parley_client::Messenger`]: commands and
//! messages are read from an input stream, conversation traffic is written
//! as plain lines. Used by the `parley` binary and testable against any
//! [`parley_client::Connector`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod render;
pub mod runtime;

pub use runtime::{Runtime, RuntimeError};
