//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Consumer about to call the metered AI API for key K:
//!     → circuit_breaker.rs can_fetch(K)   (cooldown? already fetched?)
//!     → mark_fetched(K) before the request leaves
//!     → on 429: trigger_cooldown(secs)     (pauses every key)
//!
//! guard.rs bundles the sequence; clock.rs makes time injectable.
//! ```
//!
//! # Design Decisions
//! - One breaker per session, shared by every UI surface
//! - Deduplication outlives consumer handles (remounts see the same flags)
//! - Fail silent: a failed call never unmarks its key

pub mod circuit_breaker;
pub mod clock;
pub mod guard;

pub use circuit_breaker::{BreakerPersistError, BreakerSnapshot, CircuitBreaker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{GuardedCall, RateLimitSignal};
