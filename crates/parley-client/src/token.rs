//! Bearer token sources.
//!
//! The token is read once per handshake, so a store backed by a file picks
//! up a refreshed token on the next `connect()` without restarting.

use std::{fs, path::PathBuf};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

/// Supplies the bearer credential used at connect time.
pub trait TokenStore: Send + Sync {
    /// Current token, or `None` to connect without credentials.
    fn token(&self) -> Option<String>;
}

/// A token fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Store holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Store with no token.
    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenStore for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A token read from a file on every call.
///
/// Surrounding whitespace is trimmed. A missing or empty file yields `None`.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Some(raw.trim().to_owned()).filter(|token| !token.is_empty()),
            Err(error) => {
                tracing::debug!(path = %self.path.display(), %error, "no token file");
                None
            },
        }
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// The `sub` claim of a JWT, decoded without verifying the signature.
///
/// Used only to recognize the local user's own messages; the broker is the
/// one that authenticates.
pub fn token_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()?.sub
}
