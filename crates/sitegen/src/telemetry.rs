//! Process-wide tracing setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::broadcast::JobLogLayer;
use crate::config::{LogConfig, LogFormat};
use crate::error::ConfigError;

/// Builds the filter for process log output. `RUST_LOG` wins over the
/// configured level when set.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::Tracing(format!("invalid log level '{}': {}", config.level, e))),
    }
}

/// Installs the global subscriber: formatted output filtered by `config`,
/// plus the job log layer when one is given. Records from the `log` crate are
/// bridged through `tracing-log`.
///
/// Fails if a global logger or subscriber is already installed.
pub fn init_tracing(config: &LogConfig, job_layer: Option<JobLogLayer>) -> Result<(), ConfigError> {
    let filter = env_filter(config)?;

    let output = match config.format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let subscriber = Registry::default()
        .with(output.with_filter(filter))
        .with(job_layer);

    tracing_log::LogTracer::init().map_err(|e| ConfigError::Tracing(e.to_string()))?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Tracing(e.to_string()))?;

    Ok(())
}
