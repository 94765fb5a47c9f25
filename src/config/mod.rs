//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → SessionContext builds every service from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_server_overrides, load_config, parse_config, ConfigError};
pub use schema::BulkFetchConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::ClientConfig;
pub use schema::ObservabilityConfig;
pub use schema::PreferencesConfig;
pub use schema::ServerConfig;
pub use schema::TimeoutConfig;
