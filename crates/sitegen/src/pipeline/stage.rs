//! Stage identities and the contracts external collaborators implement.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::builtin::{MarketReferenceFinder, TargetArtifactFilter};
use super::context::EntityContext;
use super::error::StageError;
use crate::error::ConfigError;
use crate::job::{Entity, JobRequest};

/// Percent at which per-entity processing starts.
pub const ENTITY_PHASE_START: f64 = 45.0;

/// Percent range shared by all entities.
pub const ENTITY_PHASE_SPAN: f64 = 50.0;

/// Step identifier carried by every progress snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    DiscoveringEntities,
    DetectingTargets,
    FilteringEntities,
    ProcessingEntity,
    FindingReferences,
    AnalyzingReferences,
    GeneratingContent,
    RenderingArtifact,
    EntityCompleted,
    Completed,
    Failed,
    Cancelled,
}

impl StageId {
    /// Per-entity steps in execution order, after the `processing_entity`
    /// marker.
    pub const ENTITY_STEPS: [StageId; 5] = [
        StageId::FindingReferences,
        StageId::AnalyzingReferences,
        StageId::GeneratingContent,
        StageId::RenderingArtifact,
        StageId::EntityCompleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::DiscoveringEntities => "discovering_entities",
            StageId::DetectingTargets => "detecting_targets",
            StageId::FilteringEntities => "filtering_entities",
            StageId::ProcessingEntity => "processing_entity",
            StageId::FindingReferences => "finding_references",
            StageId::AnalyzingReferences => "analyzing_references",
            StageId::GeneratingContent => "generating_content",
            StageId::RenderingArtifact => "rendering_artifact",
            StageId::EntityCompleted => "entity_completed",
            StageId::Completed => "completed",
            StageId::Failed => "failed",
            StageId::Cancelled => "cancelled",
        }
    }

    /// Start and end percent of a bulk stage.
    pub fn bulk_range(self) -> Option<(f64, f64)> {
        match self {
            StageId::DiscoveringEntities => Some((0.0, 20.0)),
            StageId::DetectingTargets => Some((20.0, 35.0)),
            StageId::FilteringEntities => Some((35.0, ENTITY_PHASE_START)),
            _ => None,
        }
    }

    /// Position of a per-entity step within one entity's slice, from 0 to 1.
    pub fn entity_offset(self) -> Option<f64> {
        match self {
            StageId::ProcessingEntity => Some(0.0),
            StageId::FindingReferences => Some(0.1),
            StageId::AnalyzingReferences => Some(0.2),
            StageId::GeneratingContent => Some(0.5),
            StageId::RenderingArtifact => Some(0.8),
            StageId::EntityCompleted => Some(1.0),
            _ => None,
        }
    }

    /// Overall percent for a per-entity step of the entity at `position`
    /// (0-based) out of `total`.
    ///
    /// Each entity owns an equal slice of the entity phase, so the result
    /// grows with both the position and the step.
    pub fn entity_percent(self, position: usize, total: usize) -> Option<f64> {
        let offset = self.entity_offset()?;
        if total == 0 {
            return None;
        }
        let width = ENTITY_PHASE_SPAN / total as f64;
        Some(ENTITY_PHASE_START + (position as f64 + offset) * width)
    }

    pub fn is_bulk(self) -> bool {
        self.bulk_range().is_some()
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage that transforms the whole entity list at once.
///
/// Discovery is called with an empty list and returns what it found.
/// Detection returns the same entities with `has_target_artifact` resolved.
/// Filtering returns the subset that still needs processing.
#[async_trait]
pub trait BulkStage: Send + Sync {
    async fn execute(
        &self,
        request: &JobRequest,
        entities: Vec<Entity>,
    ) -> Result<Vec<Entity>, StageError>;
}

/// A stage run once per entity, threading the accumulated context through.
#[async_trait]
pub trait EntityStage: Send + Sync {
    async fn execute(&self, ctx: EntityContext) -> Result<EntityContext, StageError>;
}

/// The full set of stages a pipeline engine drives.
#[derive(Clone)]
pub struct PipelineStages {
    pub discovery: Arc<dyn BulkStage>,
    pub detection: Arc<dyn BulkStage>,
    pub filter: Arc<dyn BulkStage>,
    pub references: Arc<dyn EntityStage>,
    pub analyzer: Arc<dyn EntityStage>,
    pub generator: Arc<dyn EntityStage>,
    pub renderer: Arc<dyn EntityStage>,
}

impl PipelineStages {
    pub fn builder() -> PipelineStagesBuilder {
        PipelineStagesBuilder::default()
    }
}

/// Assembles [`PipelineStages`].
///
/// Discovery, detection, analysis, generation and rendering must be supplied.
/// Filtering defaults to [`TargetArtifactFilter`] and reference finding to
/// [`MarketReferenceFinder`].
pub struct PipelineStagesBuilder {
    discovery: Option<Arc<dyn BulkStage>>,
    detection: Option<Arc<dyn BulkStage>>,
    filter: Option<Arc<dyn BulkStage>>,
    references: Option<Arc<dyn EntityStage>>,
    analyzer: Option<Arc<dyn EntityStage>>,
    generator: Option<Arc<dyn EntityStage>>,
    renderer: Option<Arc<dyn EntityStage>>,
    max_references: usize,
}

impl Default for PipelineStagesBuilder {
    fn default() -> Self {
        Self {
            discovery: None,
            detection: None,
            filter: None,
            references: None,
            analyzer: None,
            generator: None,
            renderer: None,
            max_references: MarketReferenceFinder::DEFAULT_MAX_REFERENCES,
        }
    }
}

impl PipelineStagesBuilder {
    pub fn discovery(mut self, stage: impl BulkStage + 'static) -> Self {
        self.discovery = Some(Arc::new(stage));
        self
    }

    pub fn detection(mut self, stage: impl BulkStage + 'static) -> Self {
        self.detection = Some(Arc::new(stage));
        self
    }

    pub fn filter(mut self, stage: impl BulkStage + 'static) -> Self {
        self.filter = Some(Arc::new(stage));
        self
    }

    pub fn references(mut self, stage: impl EntityStage + 'static) -> Self {
        self.references = Some(Arc::new(stage));
        self
    }

    pub fn analyzer(mut self, stage: impl EntityStage + 'static) -> Self {
        self.analyzer = Some(Arc::new(stage));
        self
    }

    pub fn generator(mut self, stage: impl EntityStage + 'static) -> Self {
        self.generator = Some(Arc::new(stage));
        self
    }

    pub fn renderer(mut self, stage: impl EntityStage + 'static) -> Self {
        self.renderer = Some(Arc::new(stage));
        self
    }

    /// Cap used by the default reference finder.
    pub fn max_references(mut self, max: usize) -> Self {
        self.max_references = max;
        self
    }

    pub fn build(self) -> Result<PipelineStages, ConfigError> {
        let max_references = self.max_references;
        Ok(PipelineStages {
            discovery: self
                .discovery
                .ok_or(ConfigError::MissingStage("discovering_entities"))?,
            detection: self
                .detection
                .ok_or(ConfigError::MissingStage("detecting_targets"))?,
            filter: self
                .filter
                .unwrap_or_else(|| Arc::new(TargetArtifactFilter)),
            references: self
                .references
                .unwrap_or_else(|| Arc::new(MarketReferenceFinder::new(max_references))),
            analyzer: self
                .analyzer
                .ok_or(ConfigError::MissingStage("analyzing_references"))?,
            generator: self
                .generator
                .ok_or(ConfigError::MissingStage("generating_content"))?,
            renderer: self
                .renderer
                .ok_or(ConfigError::MissingStage("rendering_artifact"))?,
        })
    }
}
