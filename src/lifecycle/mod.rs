//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → shutdown_signal() resolves
//!     → CLI stops the active bulk fetch
//! ```

pub mod signals;

pub use signals::{shutdown_signal, StopSignal};
