use thiserror::Error;

use super::stage::StageId;
use crate::error::JobError;

/// Failure reported by a stage implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        StageError::Failed(message.into())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    BulkStage {
        stage: StageId,
        #[source]
        source: StageError,
    },

    #[error("{stage} failed for '{entity}': {source}")]
    EntityStage {
        stage: StageId,
        entity: String,
        #[source]
        source: StageError,
    },

    #[error("No artifact was rendered for '{0}'")]
    MissingArtifact(String),

    #[error("Job store rejected update: {0}")]
    Store(#[from] JobError),

    #[error("Pipeline task panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// True for failures confined to a single entity, which the engine may
    /// skip instead of aborting the job.
    pub fn is_entity_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::EntityStage { .. } | PipelineError::MissingArtifact(_)
        )
    }
}
