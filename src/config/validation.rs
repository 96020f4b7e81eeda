//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (counts > 0, ports distinct)
//! - Check that referenced material is present (TLS paths, API key)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use super::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("workers.count must be at least 1")]
    NoWorkers,

    #[error("workers.queue_capacity must be at least 1")]
    NoQueueCapacity,

    #[error("listener.port_retry_attempts must be at least 1")]
    NoPortAttempts,

    #[error("listener.tls.port {0} is already used by the plain listener")]
    TlsPortCollision(u16),

    #[error("listener.tls.{0} must not be empty")]
    MissingTlsPath(&'static str),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("admin.api_key must be set when admin routes are enabled")]
    MissingApiKey,
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.workers.count == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if config.workers.queue_capacity == 0 {
        errors.push(ValidationError::NoQueueCapacity);
    }
    if config.listener.port_retry_attempts == 0 {
        errors.push(ValidationError::NoPortAttempts);
    }

    if let Some(tls) = &config.listener.tls {
        if tls.port != 0 && tls.port == config.listener.port {
            errors.push(ValidationError::TlsPortCollision(tls.port));
        }
        if tls.cert_path.as_os_str().is_empty() {
            errors.push(ValidationError::MissingTlsPath("cert_path"));
        }
        if tls.key_path.as_os_str().is_empty() {
            errors.push(ValidationError::MissingTlsPath("key_path"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingApiKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
