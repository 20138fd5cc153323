use crate::config::schema::EntityFailurePolicy;
use crate::config::Config;

/// Engine settings derived from the loaded configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_references: usize,
    pub default_limit: Option<usize>,
    pub entity_failure_policy: EntityFailurePolicy,
    pub tolerate_analysis_failure: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_references: config.pipeline.max_references,
            default_limit: config.pipeline.default_limit,
            entity_failure_policy: config.pipeline.entity_failure_policy,
            tolerate_analysis_failure: config.pipeline.tolerate_analysis_failure,
        }
    }

    /// Limit for a request: its own if set, the configured default otherwise.
    pub fn effective_limit(&self, requested: Option<usize>) -> Option<usize> {
        requested.or(self.default_limit)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        let config = PipelineConfig {
            default_limit: Some(10),
            ..PipelineConfig::default()
        };
        assert_eq!(config.effective_limit(Some(3)), Some(3));
        assert_eq!(config.effective_limit(None), Some(10));
        assert_eq!(PipelineConfig::default().effective_limit(None), None);
    }
}
