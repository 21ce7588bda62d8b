//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the bus URL and value ranges
//! - Check that the selected auth mode has what it needs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{AuthMode, GatewayConfig};

const BUS_SCHEMES: &[&str] = &["nats", "tls", "ws", "wss", "memory"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("bus.url: {0}")]
    InvalidBusUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("auth.token must be set when auth.mode = \"token\"")]
    MissingToken,

    #[error("timeouts.request_secs ({http_secs}s) must exceed bus.request_timeout_ms ({bus_ms}ms)")]
    RequestTimeoutTooLong { bus_ms: u64, http_secs: u64 },
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    match url::Url::parse(&config.bus.url) {
        Ok(url) if BUS_SCHEMES.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::InvalidBusUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        ))),
        Err(e) => errors.push(ValidationError::InvalidBusUrl(e.to_string())),
    }

    let ranges: [(&'static str, u64); 5] = [
        ("bus.request_timeout_ms", config.bus.request_timeout_ms),
        ("bus.poll_interval_secs", config.bus.poll_interval_secs),
        ("stream.channel_capacity", config.stream.channel_capacity as u64),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("security.max_body_size", config.security.max_body_size as u64),
    ];
    for (field, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    // The HTTP timeout must leave room for the request bridge to answer itself.
    let http_ms = config.timeouts.request_secs.saturating_mul(1000);
    if http_ms > 0 && config.bus.request_timeout_ms >= http_ms {
        errors.push(ValidationError::RequestTimeoutTooLong {
            bus_ms: config.bus.request_timeout_ms,
            http_secs: config.timeouts.request_secs,
        });
    }

    if config.auth.mode == AuthMode::Token && config.auth.token.is_empty() {
        errors.push(ValidationError::MissingToken);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
