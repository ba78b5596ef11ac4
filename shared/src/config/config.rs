use std::fs;
use tracing::{debug, error, info};

use crate::access::{AccessPolicy, RouteClassifier, RouteTables};
use crate::types::server_config::{AppConfig, ConfigError};

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    let config = parse_config(&contents)?;

    info!("Configuration loaded successfully");
    Ok(config)
}

/// Parse and validate a TOML document.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(contents)?;
    debug!("Config: {:?}", config.server);

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.paths.web_dir.is_empty() {
        return Err(ConfigError::InvalidConfig("web_dir cannot be empty".into()));
    }

    if config.auth.token_ttl_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "token_ttl_secs must be greater than 0".into(),
        ));
    }

    if config.auth.cookie_name.is_empty()
        || config
            .auth
            .cookie_name
            .contains(|c: char| c == ';' || c == '=' || c.is_whitespace())
    {
        return Err(ConfigError::InvalidConfig(format!(
            "cookie_name {:?} is not a valid cookie name",
            config.auth.cookie_name
        )));
    }

    if config.server.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_connections must be greater than 0".into(),
        ));
    }

    if config.shell.max_redirects == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_redirects must be greater than 0".into(),
        ));
    }

    // JWT secret must be resolvable (env var or config field) and long enough.
    match config.auth.resolved_jwt_secret() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "jwt_secret must be set via the JWT_SECRET env var or auth.jwt_secret config field"
                    .into(),
            ));
        }
        Some(secret) if secret.len() < 32 => {
            return Err(ConfigError::InvalidConfig(
                "jwt_secret must be at least 32 characters long".into(),
            ));
        }
        _ => {}
    }

    // Overlapping route tables and looping destinations are startup errors.
    let tables = RouteTables::from_config(&config.routes)?;
    let classifier = RouteClassifier::new(tables);
    AccessPolicy::from_config(&config.destinations, &classifier)?;

    Ok(())
}
