//! Session-wide service container.
//!
//! # Data Flow
//! ```text
//! ClientConfig
//!     → request client (connect + request timeout) → HttpPreferencesBackend
//!     → stream client (connect timeout only)       → HttpPushTransport
//!     → fallback store (file when configured, else memory)
//!     → SessionContext { PreferenceStore, CircuitBreaker, StreamProgressTracker }
//! ```
//!
//! # Design Decisions
//! - Built once per session and handed around explicitly; there are no
//!   module-level singletons
//! - Every service is behind an `Arc` so consumers can hold it independently

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::preferences::{
    FallbackStore, FileFallbackStore, HttpPreferencesBackend, MemoryFallbackStore,
    PreferenceStore,
};
use crate::resilience::CircuitBreaker;
use crate::stream::{HttpPushTransport, StreamProgressTracker};

/// Errors raised while wiring the session services.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to open fallback store '{path}': {source}")]
    Fallback {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Owns the three session services.
#[derive(Clone)]
pub struct SessionContext {
    preferences: PreferenceStore,
    breaker: Arc<CircuitBreaker>,
    tracker: Arc<StreamProgressTracker>,
}

impl SessionContext {
    /// Build every service from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ContextError> {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);

        let request_client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .build()?;
        let stream_client = Client::builder().connect_timeout(connect_timeout).build()?;

        let token = config.server.session_token.clone();

        let backend = Arc::new(HttpPreferencesBackend::new(
            request_client,
            config.preferences_url(),
            token.clone(),
        ));

        let fallback: Arc<dyn FallbackStore> = match &config.preferences.fallback_path {
            Some(path) => Arc::new(FileFallbackStore::open(path).map_err(|source| {
                ContextError::Fallback {
                    path: path.clone(),
                    source,
                }
            })?),
            None => Arc::new(MemoryFallbackStore::new()),
        };

        let preferences =
            PreferenceStore::new(backend, fallback, config.preferences.fallback_prefix.clone());
        let breaker = Arc::new(CircuitBreaker::from_config(&config.circuit_breaker));
        let transport = Arc::new(HttpPushTransport::new(
            stream_client,
            config.bulk_fetch_url(),
            token,
        ));
        let tracker = Arc::new(StreamProgressTracker::new(transport));

        tracing::debug!(
            base_url = %config.server.base_url,
            authenticated = config.server.session_token.is_some(),
            "Session context ready"
        );

        Ok(Self {
            preferences,
            breaker,
            tracker,
        })
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    pub fn tracker(&self) -> Arc<StreamProgressTracker> {
        Arc::clone(&self.tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults() {
        let context = SessionContext::from_config(&ClientConfig::default()).unwrap();

        assert!(context.preferences().snapshot().is_empty());
        assert!(context.breaker().can_fetch("now-playing:1"));
        assert!(!context.tracker().is_fetching());
    }

    #[test]
    fn test_clones_share_services() {
        let context = SessionContext::from_config(&ClientConfig::default()).unwrap();
        let other = context.clone();

        context.breaker().mark_fetched("artist:42");
        assert!(!other.breaker().can_fetch("artist:42"));
        assert!(Arc::ptr_eq(&context.tracker(), &other.tracker()));
    }

    #[test]
    fn test_file_fallback_is_opened() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::default();
        config.preferences.fallback_path =
            Some(dir.path().join("prefs.json").to_string_lossy().into_owned());

        assert!(SessionContext::from_config(&config).is_ok());
    }
}
