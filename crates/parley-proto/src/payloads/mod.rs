//! JSON payloads carried in frame bodies.
//!
//! Field names follow the broker's JSON. Where the broker historically used
//! Spanish field names (`contenido`, `fechaEnvio`, ...) the English name is
//! canonical and the Spanish one is accepted as an alias on decode.
//!
//! # Invariants
//!
//! - Decode Leniency: unknown fields are ignored, so broker additions never
//!   break a client.
//! - Encode Canonical: encoding always emits the field names the broker's
//!   command handlers expect (see [`outbound`]).

pub mod inbound;
pub mod outbound;

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};

pub use self::{
    inbound::{ConversationPayload, Envelope, EnvelopeKind, MessagePayload, TypingPayload},
    outbound::{EditPayload, SendPayload},
};
use crate::errors::Result;

/// UTC instant as carried in JSON.
///
/// Decodes RFC 3339 as well as zone-less ISO-8601 date-times
/// (`2024-05-01T10:00:00.123`), which are taken to be UTC. Encodes RFC 3339
/// with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wrap a UTC date-time.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Parse either accepted representation.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self(at.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| Self(naive.and_utc()))
    }

    /// Underlying date-time.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw:?}")))
    }
}

/// Encode a payload as a JSON frame body.
pub fn encode_json<T: Serialize>(payload: &T) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}

/// Decode a JSON frame body.
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}
