//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("grant.max_attempts must be at least 1")]
    ZeroMaxAttempts,
    #[error("grant.lock_timeout_ms must be at least 1")]
    ZeroLockTimeout,
    #[error("authority.roots contains an empty principal id")]
    EmptyRootId,
    #[error("authority.roots lists '{0}' more than once")]
    DuplicateRoot(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if config.grant.max_attempts == 0 {
        errors.push(ValidationError::ZeroMaxAttempts);
    }
    if config.grant.lock_timeout_ms == 0 {
        errors.push(ValidationError::ZeroLockTimeout);
    }

    let mut seen = HashSet::new();
    for root in &config.authority.roots {
        if root.as_str().trim().is_empty() {
            errors.push(ValidationError::EmptyRootId);
        } else if !seen.insert(root.as_str()) {
            errors.push(ValidationError::DuplicateRoot(root.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
