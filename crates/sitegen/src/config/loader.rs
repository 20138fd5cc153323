use std::path::Path;
use std::str::FromStr;

use crate::config::schema::{Config, EntityFailurePolicy, LogFormat};
use crate::error::ConfigError;

pub const ENV_LOG_LEVEL: &str = "SITEGEN_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SITEGEN_LOG_FORMAT";
pub const ENV_MAX_REFERENCES: &str = "SITEGEN_MAX_REFERENCES";
pub const ENV_DEFAULT_LIMIT: &str = "SITEGEN_DEFAULT_LIMIT";
pub const ENV_ENTITY_FAILURE_POLICY: &str = "SITEGEN_ENTITY_FAILURE_POLICY";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Applies `SITEGEN_*` environment variables on top of `config`.
pub fn apply_env_overrides(mut config: Config) -> Result<Config, ConfigError> {
    if let Some(level) = env_var(ENV_LOG_LEVEL) {
        config.log.level = level;
    }
    if let Some(format) = env_parse::<LogFormat>(ENV_LOG_FORMAT)? {
        config.log.format = format;
    }
    if let Some(max) = env_parse::<usize>(ENV_MAX_REFERENCES)? {
        config.pipeline.max_references = max;
    }
    if let Some(limit) = env_parse::<usize>(ENV_DEFAULT_LIMIT)? {
        config.pipeline.default_limit = Some(limit);
    }
    if let Some(policy) = env_parse::<EntityFailurePolicy>(ENV_ENTITY_FAILURE_POLICY)? {
        config.pipeline.entity_failure_policy = policy;
    }

    validate_config(&config)?;

    Ok(config)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_var(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.pipeline.default_limit == Some(0) {
        return Err(ConfigError::Validation {
            message: "pipeline.default_limit must be greater than zero".to_string(),
        });
    }

    for (key, value) in [
        ("log.level", &config.log.level),
        ("log.forward_level", &config.log.forward_level),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", key),
            });
        }
    }

    if config.log.forward_level.parse::<tracing::Level>().is_err() {
        return Err(ConfigError::Validation {
            message: format!(
                "log.forward_level '{}' is not a log level",
                config.log.forward_level
            ),
        });
    }

    Ok(())
}
