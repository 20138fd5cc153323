pub mod builtin;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod progress;
pub mod stage;

pub use builtin::{MarketReferenceFinder, TargetArtifactFilter};
pub use config::PipelineConfig;
pub use context::EntityContext;
pub use engine::PipelineEngine;
pub use error::{PipelineError, StageError};
pub use progress::{NoopPublisher, ProgressTracker, Publisher};
pub use stage::{BulkStage, EntityStage, PipelineStages, PipelineStagesBuilder, StageId};
