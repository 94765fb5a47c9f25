//! Bulk-fetch progress subsystem.
//!
//! # Data Flow
//! ```text
//! start_fetch():
//!     → tracker.rs (reset view, new session id + cancellation token)
//!     → spawned driver: transport.rs connect()
//!     → sse.rs (bytes → frames) → events.rs (frames → typed events)
//!     → tracker.rs apply() → watch channel → subscribers
//!
//! stop_fetch():
//!     cancel token → driver drops the stream → connection closed
//! ```
//!
//! # Design Decisions
//! - One tracker per session; one connection per tracker at a time
//! - Transport is a trait so the state machine can run without a server
//! - Subscribers observe whole snapshots, never partial updates

pub mod error;
pub mod events;
pub mod sse;
pub mod tracker;
pub mod transport;

pub use error::StreamError;
pub use events::{FetchStats, LogEntry, LogKind, StreamEvent};
pub use sse::{SseDecoder, SseFrame};
pub use tracker::{StreamPhase, StreamProgressTracker, TrackerSnapshot, TrackerUpdates};
pub use transport::{decode_sse, EventStream, HttpPushTransport, PushTransport};
