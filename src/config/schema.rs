//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the session coordinator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Server connection settings.
    pub server: ServerConfig,

    /// Preference cache settings.
    pub preferences: PreferencesConfig,

    /// AI call circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Bulk metadata fetch stream settings.
    pub bulk_fetch: BulkFetchConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the web API (e.g., "http://localhost:4110").
    pub base_url: String,

    /// Optional session token sent as a Bearer credential.
    pub session_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4110".to_string(),
            session_token: None,
        }
    }
}

/// Preference cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Path of the whole-document preferences endpoint.
    pub endpoint_path: String,

    /// Prefix applied to keys mirrored into the local fallback store.
    pub fallback_prefix: String,

    /// JSON file backing the fallback store. In-memory when unset.
    pub fallback_path: Option<String>,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/apis/web/v1/user/preferences".to_string(),
            fallback_prefix: "pref_".to_string(),
            fallback_path: None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Cooldown applied when a guarded call is rate limited, in seconds.
    pub default_cooldown_secs: u64,

    /// Minimum interval between "cooldown active" warnings, in seconds.
    pub warn_interval_secs: u64,

    /// Snapshot file for keeping breaker state across restarts.
    /// Session-only (in-memory) when unset.
    pub persistence_path: Option<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            default_cooldown_secs: 60,
            warn_interval_secs: 5,
            persistence_path: None,
        }
    }
}

/// Bulk fetch stream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BulkFetchConfig {
    /// Path of the server-push endpoint.
    pub endpoint_path: String,
}

impl Default for BulkFetchConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/apis/web/v1/spotify/bulk-fetch-sse".to_string(),
        }
    }
}

/// Timeout configuration for outbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total request timeout in seconds. Not applied to the push stream.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl ClientConfig {
    /// Full URL of the preferences endpoint.
    pub fn preferences_url(&self) -> String {
        join_url(&self.server.base_url, &self.preferences.endpoint_path)
    }

    /// Full URL of the bulk fetch stream.
    pub fn bulk_fetch_url(&self) -> String {
        join_url(&self.server.base_url, &self.bulk_fetch.endpoint_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
