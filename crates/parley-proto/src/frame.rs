//! STOMP 1.2 frame type and text codec.
//!
//! A frame on the wire is:
//!
//! ```text
//! COMMAND EOL
//! *( header EOL )
//! EOL
//! *OCTET
//! NUL
//! *( EOL )
//! ```
//!
//! EOL is `\n` or `\r\n`. Each WebSocket text message carries exactly one
//! frame, so the codec works on whole `&str` values rather than a byte
//! stream. A message consisting only of EOLs is a heart-beat and decodes to
//! `None`.
//!
//! # Invariants
//!
//! - Header Order: headers are kept in wire order. When a header repeats, the
//!   first occurrence is the one reported by [`Frame::header`].
//! - Body Bounds: when `content-length` is present the body is exactly that
//!   many bytes and may contain NUL; otherwise it ends at the first NUL.
//! - Escaping: header names and values are escaped on every command except
//!   `CONNECT`, `STOMP` and `CONNECTED`, whose headers travel raw.

use std::{borrow::Cow, fmt, str::FromStr};

use crate::errors::{ProtocolError, Result};

/// Protocol version negotiated in `accept-version` / `version`.
pub const STOMP_VERSION: &str = "1.2";

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Client handshake (1.2 alias of `CONNECT`).
    Stomp,
    /// Broker handshake reply.
    Connected,
    /// Client publish to a destination.
    Send,
    /// Client subscription request.
    Subscribe,
    /// Client subscription release.
    Unsubscribe,
    /// Client message acknowledgement.
    Ack,
    /// Client negative acknowledgement.
    Nack,
    /// Transaction start.
    Begin,
    /// Transaction commit.
    Commit,
    /// Transaction rollback.
    Abort,
    /// Graceful client shutdown.
    Disconnect,
    /// Broker delivery to a subscription.
    Message,
    /// Broker acknowledgement of a `receipt` header.
    Receipt,
    /// Broker error report.
    Error,
}

impl Command {
    /// Wire spelling of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "" => return Err(ProtocolError::EmptyFrame),
            other => return Err(ProtocolError::UnknownCommand(other.to_owned())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Pure data holder. Constructors exist for every frame the client sends and
/// for the broker frames the test harness needs to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    headers: Vec<(String, String)>,
    body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body and its `content-length`.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.headers.retain(|(name, _)| name != "content-length");
        self.headers.push(("content-length".to_owned(), self.body.len().to_string()));
        self
    }

    /// `CONNECT` frame carrying the bearer credential, if any.
    pub fn connect(host: &str, token: Option<&str>) -> Self {
        let frame = Self::new(Command::Connect)
            .with_header("accept-version", STOMP_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", "0,0");
        match token {
            Some(token) => frame.with_header("Authorization", format!("Bearer {token}")),
            None => frame,
        }
    }

    /// `SUBSCRIBE` frame with automatic acknowledgement.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// `UNSUBSCRIBE` frame for a subscription id.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    /// `SEND` frame. A `None` body produces an empty frame with no
    /// content headers.
    pub fn send(destination: &str, json_body: Option<String>) -> Self {
        let frame = Self::new(Command::Send).with_header("destination", destination);
        match json_body {
            Some(body) => frame.with_header("content-type", "application/json").with_body(body),
            None => frame,
        }
    }

    /// `DISCONNECT` frame.
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// `CONNECTED` frame as a broker would send it.
    pub fn connected() -> Self {
        Self::new(Command::Connected)
            .with_header("version", STOMP_VERSION)
            .with_header("heart-beat", "0,0")
    }

    /// `MESSAGE` frame as a broker would send it.
    pub fn message(destination: &str, subscription: &str, message_id: &str, body: &str) -> Self {
        Self::new(Command::Message)
            .with_header("destination", destination)
            .with_header("subscription", subscription)
            .with_header("message-id", message_id)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// `ERROR` frame as a broker would send it.
    pub fn error(message: &str) -> Self {
        Self::new(Command::Error).with_header("message", message)
    }

    /// First value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// All headers in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Value of a header the frame cannot be interpreted without.
    pub fn require_header(&self, name: &'static str) -> Result<&str> {
        self.header(name)
            .ok_or(ProtocolError::MissingHeader { command: self.command.as_str(), header: name })
    }

    /// `destination` header.
    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// `subscription` header of a `MESSAGE` frame.
    pub fn subscription(&self) -> Option<&str> {
        self.header("subscription")
    }

    /// Frame body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Encode into the text of one WebSocket message.
    pub fn encode(&self) -> String {
        let escape_headers = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());

        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one WebSocket message.
    ///
    /// Returns `Ok(None)` for heart-beats (a message made only of EOLs).
    pub fn decode(input: &str) -> Result<Option<Self>> {
        let input = input.trim_start_matches(['\r', '\n']);
        if input.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) = next_line(input).ok_or(ProtocolError::MissingTerminator)?;
        let command: Command = command_line.parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, tail) = next_line(rest).ok_or(ProtocolError::MissingTerminator)?;
            rest = tail;
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_owned()))?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_owned(), value.to_owned()));
            }
        }

        let body = match find_header(&headers, "content-length") {
            Some(raw) => {
                let expected: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::InvalidContentLength(raw.to_owned()))?;
                let body = rest
                    .get(..expected)
                    .ok_or(ProtocolError::TruncatedBody { expected, available: rest.len() })?;
                if !rest[expected..].starts_with('\0') {
                    return Err(ProtocolError::MissingTerminator);
                }
                body
            },
            None => {
                let end = rest.find('\0').ok_or(ProtocolError::MissingTerminator)?;
                &rest[..end]
            },
        };

        Ok(Some(Self { command, headers, body: body.to_owned() }))
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
}

/// Split off one EOL-terminated line. `None` if no EOL remains.
fn next_line(input: &str) -> Option<(&str, &str)> {
    let end = input.find('\n')?;
    let line = &input[..end];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[end + 1..]))
}

fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\\', '\r', '\n', ':']) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(ProtocolError::InvalidEscape(other)),
            None => return Err(ProtocolError::MalformedHeader(raw.to_owned())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/conversation/42\nsubscription:sub-0\nmessage-id:1\n\n{}\0";
        let frame = Frame::decode(raw).unwrap().unwrap();

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.destination(), Some("/topic/conversation/42"));
        assert_eq!(frame.subscription(), Some("sub-0"));
        assert_eq!(frame.body(), "{}");
    }

    #[test]
    fn heartbeat_decodes_to_none() {
        assert_eq!(Frame::decode("\n").unwrap(), None);
        assert_eq!(Frame::decode("\r\n\r\n").unwrap(), None);
        assert_eq!(Frame::decode("").unwrap(), None);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let raw = "CONNECTED\r\nversion:1.2\r\n\r\n\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
    }

    #[test]
    fn header_values_are_escaped_outside_handshake() {
        let frame = Frame::new(Command::Send).with_header("note", "a:b\nc\\d");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\nc\\\\d\n"), "{encoded:?}");

        let decoded = Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded.header("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn connect_headers_travel_raw() {
        let frame = Frame::new(Command::Connect).with_header("passcode", "a:b");
        assert!(frame.encode().contains("passcode:a:b\n"));

        let raw = "CONNECTED\nserver:broker\\c1\n\n\0";
        let decoded = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(decoded.header("server"), Some("broker\\c1"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.header("foo"), Some("first"));
        assert_eq!(frame.headers().len(), 2);
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let raw = "MESSAGE\ncontent-length:3\n\na\0b\0\n\n";
        let frame = Frame::decode(raw).unwrap().unwrap();
        assert_eq!(frame.body(), "a\0b");
    }

    #[test]
    fn truncated_body_is_rejected() {
        let raw = "MESSAGE\ncontent-length:10\n\nabc\0";
        assert_eq!(
            Frame::decode(raw),
            Err(ProtocolError::TruncatedBody { expected: 10, available: 4 })
        );
    }

    #[test]
    fn invalid_content_length_is_rejected() {
        let raw = "MESSAGE\ncontent-length:ten\n\nabc\0";
        assert!(matches!(Frame::decode(raw), Err(ProtocolError::InvalidContentLength(_))));
    }

    #[test]
    fn missing_terminator_is_rejected() {
        assert_eq!(Frame::decode("MESSAGE\n\nbody"), Err(ProtocolError::MissingTerminator));
        assert_eq!(Frame::decode("MESSAGE\nfoo:bar"), Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert_eq!(
            Frame::decode("HELLO\n\n\0"),
            Err(ProtocolError::UnknownCommand("HELLO".to_owned()))
        );
    }

    #[test]
    fn undefined_escape_is_rejected() {
        let raw = "MESSAGE\nfoo:\\t\n\n\0";
        assert_eq!(Frame::decode(raw), Err(ProtocolError::InvalidEscape('t')));
    }

    #[test]
    fn header_without_separator_is_rejected() {
        let raw = "MESSAGE\nnot-a-header\n\n\0";
        assert!(matches!(Frame::decode(raw), Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn send_without_body_has_no_content_headers() {
        let frame = Frame::send("/app/chat/1/typing", None);
        assert_eq!(frame.header("content-length"), None);
        assert_eq!(frame.header("content-type"), None);
        assert_eq!(frame.encode(), "SEND\ndestination:/app/chat/1/typing\n\n\0");
    }

    #[test]
    fn with_body_replaces_content_length() {
        let frame = Frame::new(Command::Send).with_body("abc").with_body("héllo");
        let lengths: Vec<_> =
            frame.headers().iter().filter(|(name, _)| name == "content-length").collect();
        assert_eq!(lengths.len(), 1);
        assert_eq!(frame.header("content-length"), Some("6"));
    }

    #[test]
    fn require_header_reports_command() {
        let frame = Frame::new(Command::Message);
        assert_eq!(
            frame.require_header("subscription"),
            Err(ProtocolError::MissingHeader { command: "MESSAGE", header: "subscription" })
        );
    }
}
