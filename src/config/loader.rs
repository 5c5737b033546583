//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{PowerupsConfig, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// JSON document holding the powerups section.
pub const ENV_POWERUPS_CONFIG: &str = "POWERUPS_CONFIG";
/// Upstream URL override.
pub const ENV_UPSTREAM_URL: &str = "UPSTREAM_URL";
/// Listen port override; binds on all interfaces.
pub const ENV_PORT: &str = "PORT";

/// Error type for configuration loading. Any of these is fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {var}: {source}")]
    Json {
        var: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {var} `{value}`")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ProxyConfig = toml::from_str(&content)?;
    config.powerups.apply_defaults();

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the effective configuration: defaults or the given file, then
/// process environment overrides, then defaulting and validation.
pub fn load(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    load_with(path, |var| std::env::var(var).ok())
}

/// Same as [`load`] with an explicit environment lookup.
pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: ProxyConfig = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env(&mut config, lookup)?;
    config.powerups.apply_defaults();

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides on top of `config`. Empty variables are ignored.
pub fn apply_env<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.is_empty());

    if let Some(raw) = get(ENV_POWERUPS_CONFIG) {
        let powerups: PowerupsConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
                var: ENV_POWERUPS_CONFIG,
                source,
            })?;
        config.powerups = powerups;
    }

    if let Some(url) = get(ENV_UPSTREAM_URL) {
        config.upstream.url = url;
    }

    if let Some(port) = get(ENV_PORT) {
        let port: u16 = port.parse().map_err(|_| ConfigError::Env {
            var: ENV_PORT,
            value: port.clone(),
        })?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }

    Ok(())
}
