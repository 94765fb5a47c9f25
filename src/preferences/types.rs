//! Preference document types and error definitions.

use serde_json::{Map, Value};
use thiserror::Error;

/// The whole preference document: key → arbitrary JSON value.
pub type PreferenceSet = Map<String, Value>;

/// Errors that can occur while talking to the preferences endpoint.
///
/// Cloneable so a single-flight load can hand the same result to every
/// waiting caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreferenceError {
    /// The request could not be sent or the response could not be read.
    #[error("network error: {0}")]
    Network(String),

    /// The server rejected the session (HTTP 401).
    #[error("not authenticated")]
    Unauthorized,

    /// Any other non-success status.
    #[error("server returned status {0}")]
    Status(u16),

    /// The response body was not a JSON object.
    #[error("malformed preferences payload: {0}")]
    Malformed(String),
}

impl PreferenceError {
    /// Whether the failure should shadow writes into the fallback store.
    pub fn uses_fallback(&self) -> bool {
        matches!(self, PreferenceError::Unauthorized | PreferenceError::Network(_))
    }
}

/// Result of a `load_all` call.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The cache was replaced with the server document.
    Loaded { keys: usize },
    /// The server answered 401; reads rely on the fallback store.
    Unauthenticated,
    /// The load failed; the cache was left untouched.
    Failed(PreferenceError),
}

/// Result of the background persist started by `set`.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The server accepted the document.
    Persisted,
    /// The server was unreachable or rejected the session; the pair was
    /// mirrored into the fallback store.
    MirroredLocally(PreferenceError),
    /// The server rejected the document for another reason. Only logged.
    Failed(PreferenceError),
}

/// What the store has learned about the session from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unknown,
    Authenticated,
    Unauthenticated,
}
