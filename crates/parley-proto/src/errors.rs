//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames and payloads.
///
/// None of these are fatal to a session: the caller decides whether a bad
/// frame ends the connection (handshake) or is discarded (subscriptions).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame has no command line.
    #[error("frame is empty")]
    EmptyFrame,

    /// Command line is not a known STOMP command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Header line without a `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Header contains an escape sequence STOMP does not define.
    #[error("invalid escape sequence \\{0} in header")]
    InvalidEscape(char),

    /// `content-length` is not a valid byte count.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// Body is shorter than its `content-length` or splits a UTF-8 sequence.
    #[error("body truncated: expected {expected} bytes, {available} available")]
    TruncatedBody {
        /// Declared body length.
        expected: usize,
        /// Bytes present after the header block.
        available: usize,
    },

    /// Frame does not end with a NUL octet.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,

    /// A header the frame requires is absent.
    #[error("{command} frame is missing required header {header:?}")]
    MissingHeader {
        /// Command of the offending frame.
        command: &'static str,
        /// Name of the missing header.
        header: &'static str,
    },

    /// JSON body could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
