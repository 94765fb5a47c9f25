//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, cooldown > 0)
//! - Check URLs, endpoint paths and addresses are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable reason.
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.server.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "server.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("server.base_url", e.to_string())),
    }

    if !config.preferences.endpoint_path.starts_with('/') {
        errors.push(ValidationError::new(
            "preferences.endpoint_path",
            "must start with '/'",
        ));
    }
    if !config.bulk_fetch.endpoint_path.starts_with('/') {
        errors.push(ValidationError::new(
            "bulk_fetch.endpoint_path",
            "must start with '/'",
        ));
    }
    if config.preferences.fallback_prefix.is_empty() {
        errors.push(ValidationError::new(
            "preferences.fallback_prefix",
            "must not be empty",
        ));
    }

    if config.circuit_breaker.default_cooldown_secs == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.default_cooldown_secs",
            "must be greater than 0",
        ));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ClientConfig::default();
        config.server.base_url = "ftp://example.com".into();
        config.preferences.endpoint_path = "user/preferences".into();
        config.circuit_breaker.default_cooldown_secs = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "server.base_url",
                "preferences.endpoint_path",
                "circuit_breaker.default_cooldown_secs",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        let mut config = ClientConfig::default();
        config.server.base_url = "not a url".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "server.base_url");
    }
}
