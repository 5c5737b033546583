//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the upstream URL and header names
//! - Validate value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::http::upstream::UpstreamTarget;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} `{value}`: not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid upstream url `{url}`: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("invalid header name `{name}` for {field}")]
    InvalidHeaderName { field: &'static str, name: String },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },
}

/// Validate a loaded configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if let Err(e) = UpstreamTarget::parse(&config.upstream.url) {
        errors.push(ValidationError::InvalidUpstream {
            url: config.upstream.url.clone(),
            reason: e.to_string(),
        });
    }

    let timeouts = [
        ("timeouts.read_secs", config.timeouts.read_secs),
        ("timeouts.write_secs", config.timeouts.write_secs),
        ("timeouts.upstream_pool_idle_secs", config.timeouts.upstream_pool_idle_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout { field });
        }
    }

    if let Some(user_id) = config.powerups.user_id() {
        check_header(&mut errors, "powerups.userId.header", &user_id.header);
    }
    if let Some(bot_detection) = config.powerups.bot_detection() {
        check_header(
            &mut errors,
            "powerups.botDetection.headerName",
            &bot_detection.header_name,
        );
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

fn check_header(errors: &mut Vec<ValidationError>, field: &'static str, name: &str) {
    if HeaderName::from_bytes(name.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName {
            field,
            name: name.to_string(),
        });
    }
}
