//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use crate::config::schema::TunnelConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, reason: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, reason } => write!(f, "Invalid {}: {}", var, reason),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<TunnelConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => TunnelConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay values from the environment. Credentials and the conversation id
/// are usually supplied this way rather than committed to a file.
pub fn apply_env_overrides<F>(config: &mut TunnelConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("TUNNEL_RELAY_URL") {
        config.transport.relay_url = url;
    }

    let chat_id = lookup("TUNNEL_CHAT_ID")
        .map(|v| ("TUNNEL_CHAT_ID", v))
        .or_else(|| lookup("CHAT_ID").map(|v| ("CHAT_ID", v)));
    if let Some((var, raw)) = chat_id {
        config.transport.chat_id = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
            ConfigError::Env { var, reason: e.to_string() }
        })?;
    }

    if let Some(token) = lookup("TUNNEL_AUTH_TOKEN") {
        config.transport.auth_token = Some(token);
    }
    if let Some(addr) = lookup("TUNNEL_BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }

    Ok(())
}
