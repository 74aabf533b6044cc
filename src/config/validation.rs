//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool sizes > 0)
//! - Reject duplicate API keys
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BootstrapConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::BootstrapConfig;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &BootstrapConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(host) = &config.server.host {
        if host.trim().is_empty() {
            errors.push(ValidationError::new("server.host", "must not be empty"));
        }
    }
    if config.server.max_body_size == 0 {
        errors.push(ValidationError::new("server.max_body_size", "must be greater than 0"));
    }
    if config.shutdown.timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.timeout_secs", "must be greater than 0"));
    }
    if config.workers.max_blocking == 0 {
        errors.push(ValidationError::new("workers.max_blocking", "must be greater than 0"));
    }
    if config.watched.poll && config.watched.poll_interval_secs == 0 {
        errors.push(ValidationError::new(
            "watched.poll_interval_secs",
            "must be greater than 0 when polling",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    let mut seen = HashSet::new();
    for key in &config.access.api_keys {
        if key.key.is_empty() {
            errors.push(ValidationError::new(
                "access.api_keys",
                format!("key for {:?} is empty", key.name),
            ));
        } else if !seen.insert(key.key.as_str()) {
            errors.push(ValidationError::new(
                "access.api_keys",
                format!("duplicate key for {:?}", key.name),
            ));
        }
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
    use crate::config::schema::ApiKeyConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&BootstrapConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_api_keys_rejected() {
        let mut config = BootstrapConfig::default();
        for name in ["a", "b"] {
            config.access.api_keys.push(ApiKeyConfig {
                name: name.into(),
                key: "same".into(),
                capabilities: Vec::new(),
            });
        }

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "access.api_keys");
    }

    #[test]
    fn bad_metrics_address_only_matters_when_enabled() {
        let mut config = BootstrapConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
