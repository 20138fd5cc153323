pub mod broadcast;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod telemetry;

pub use broadcast::{Event, EventBus, JobLogLayer, JobStore, Subscriber};
pub use config::{apply_env_overrides, load_config, Config};
pub use error::{ConfigError, JobError, Result, SitegenError};
pub use job::{Artifact, Entity, Job, JobRequest, JobStatus, ProgressDetails, ProgressSnapshot};
pub use orchestrator::Orchestrator;
pub use pipeline::{
    BulkStage, EntityContext, EntityStage, PipelineError, PipelineStages, StageError, StageId,
};
pub use telemetry::init_tracing;
