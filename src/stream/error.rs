//! Stream error definitions.

use thiserror::Error;

/// Errors raised while opening or reading the push stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The connection could not be established.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// The server answered with a non-success status.
    #[error("server returned status {0}")]
    Status(u16),

    /// The connection broke or closed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// An event payload did not match its schema.
    #[error("malformed '{event}' event: {reason}")]
    Malformed { event: String, reason: String },
}
