use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            log: LogConfig::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive for the process log, e.g. `info` or
    /// `info,sitegen::pipeline=debug`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Minimum level forwarded to job subscribers as log events.
    #[serde(default = "default_level")]
    pub forward_level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
            forward_level: default_level(),
        }
    }
}

/// What the engine does when one entity's sub-pipeline fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntityFailurePolicy {
    /// Log the failure and move on to the next entity.
    #[default]
    Continue,
    /// Fail the whole job.
    Abort,
}

impl std::str::FromStr for EntityFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(EntityFailurePolicy::Continue),
            "abort" => Ok(EntityFailurePolicy::Abort),
            other => Err(format!("unknown entity failure policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_max_references")]
    pub max_references: usize,
    /// Applied when a request does not carry its own limit.
    #[serde(default)]
    pub default_limit: Option<usize>,
    #[serde(default)]
    pub entity_failure_policy: EntityFailurePolicy,
    #[serde(default = "default_true")]
    pub tolerate_analysis_failure: bool,
}

fn default_max_references() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_references: default_max_references(),
            default_limit: None,
            entity_failure_policy: EntityFailurePolicy::Continue,
            tolerate_analysis_failure: true,
        }
    }
}
