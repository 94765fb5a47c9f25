//! Preference subsystem.
//!
//! # Data Flow
//! ```text
//! load_all():
//!     → store.rs (join in-flight load or start one)
//!     → backend.rs (GET whole document)
//!     → cache replaced wholesale | 401: fallback reads | error: cache kept
//!
//! set(key, value):
//!     → store.rs (merge into cache immediately)
//!     → spawned persist: backend.rs (POST whole document)
//!     → on 401 / network error: fallback.rs (mirror the single pair)
//!
//! get(key, default):
//!     cache → fallback.rs → default   (never touches the network)
//! ```

pub mod backend;
pub mod fallback;
pub mod store;
pub mod types;

pub use backend::{HttpPreferencesBackend, PreferencesBackend};
pub use fallback::{FallbackStore, FileFallbackStore, MemoryFallbackStore};
pub use store::PreferenceStore;
pub use types::{AuthState, LoadOutcome, PreferenceError, PreferenceSet, SaveOutcome};
