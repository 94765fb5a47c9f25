//! Client-side session coordination.
//!
//! Three independent services shared by every consumer in one session:
//! - [`preferences::PreferenceStore`]: single-flight preference cache with
//!   optimistic writes and local fallback
//! - [`resilience::CircuitBreaker`]: per-key deduplication and a global
//!   cooldown for a rate-limited API
//! - [`stream::StreamProgressTracker`]: one server-push bulk operation with
//!   a typed log and progress
//!
//! [`context::SessionContext`] builds them from a [`config::ClientConfig`].

pub mod config;
pub mod context;
pub mod lifecycle;
pub mod observability;
pub mod preferences;
pub mod resilience;
pub mod stream;

pub use config::ClientConfig;
pub use context::{ContextError, SessionContext};
pub use preferences::PreferenceStore;
pub use resilience::CircuitBreaker;
pub use stream::StreamProgressTracker;
