//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Minimum accepted length of the token signing secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("auth.token_secret must be at least {MIN_SECRET_LEN} characters, got {0}")]
    WeakTokenSecret(usize),
    #[error("heartbeat.timeout_secs must exceed heartbeat.check_interval_secs")]
    HeartbeatTooShort,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    let secret_len = config.auth.token_secret.len();
    if secret_len < MIN_SECRET_LEN {
        errors.push(ValidationError::WeakTokenSecret(secret_len));
    }

    if config.heartbeat.check_interval_secs == 0 {
        errors.push(ValidationError::Zero("heartbeat.check_interval_secs"));
    } else if config.heartbeat.timeout_secs <= config.heartbeat.check_interval_secs {
        errors.push(ValidationError::HeartbeatTooShort);
    }

    if config.limits.outbound_queue == 0 {
        errors.push(ValidationError::Zero("limits.outbound_queue"));
    }
    if config.limits.message_rate_per_second == 0 {
        errors.push(ValidationError::Zero("limits.message_rate_per_second"));
    }
    if config.limits.message_burst == 0 {
        errors.push(ValidationError::Zero("limits.message_burst"));
    }
    if config.outbox.batch_size == 0 {
        errors.push(ValidationError::Zero("outbox.batch_size"));
    }
    if config.outbox.max_attempts == 0 {
        errors.push(ValidationError::Zero("outbox.max_attempts"));
    }

    // Database path validation
    let db_path = Path::new(&config.database.path);
    if config.database.path != ":memory:"
        && let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(
            config.database.path.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
