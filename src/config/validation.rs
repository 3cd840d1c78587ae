//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check the relay URL and conversation id
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TunnelConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::TunnelConfig;

/// Smallest relay limit that still fits an envelope header and a tiny message.
pub const MIN_MESSAGE_LEN: usize = 256;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    for pattern in &config.ingress.allowed_hosts {
        let bare = pattern.strip_prefix("*.").unwrap_or(pattern);
        if bare.is_empty() || bare.contains('*') {
            errors.push(ValidationError::new(
                "ingress.allowed_hosts",
                format!("'{}' is not a host or '*.suffix' pattern", pattern),
            ));
        }
    }

    if config.correlation.reply_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "correlation.reply_timeout_secs",
            "must be greater than zero",
        ));
    }
    if config.correlation.max_pending == 0 {
        errors.push(ValidationError::new(
            "correlation.max_pending",
            "must be greater than zero",
        ));
    }

    if config.egress.fetch_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "egress.fetch_timeout_secs",
            "must be greater than zero",
        ));
    }
    if config.egress.raw_read_deadline_ms == 0 {
        errors.push(ValidationError::new(
            "egress.raw_read_deadline_ms",
            "must be greater than zero",
        ));
    }

    match url::Url::parse(&config.transport.relay_url) {
        Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => {}
        Ok(url) => errors.push(ValidationError::new(
            "transport.relay_url",
            format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "transport.relay_url",
            format!("invalid URL: {}", e),
        )),
    }
    if config.transport.chat_id == 0 {
        errors.push(ValidationError::new(
            "transport.chat_id",
            "must be set (or provide TUNNEL_CHAT_ID)",
        ));
    }
    if config.transport.max_message_len < MIN_MESSAGE_LEN {
        errors.push(ValidationError::new(
            "transport.max_message_len",
            format!("must be at least {}", MIN_MESSAGE_LEN),
        ));
    }
    if config.transport.send_burst == 0 {
        errors.push(ValidationError::new(
            "transport.send_burst",
            "must be greater than zero",
        ));
    }
    if config.transport.connect_attempts == 0 {
        errors.push(ValidationError::new(
            "transport.connect_attempts",
            "must be greater than zero",
        ));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("'{}' is not 'pretty' or 'json'", config.observability.log_format),
        ));
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
