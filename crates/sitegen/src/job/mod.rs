pub mod entity;
pub mod progress;
pub mod record;
pub mod validate;

pub use entity::Entity;
pub use progress::{ProgressDetails, ProgressSnapshot};
pub use record::{Artifact, Job, JobRequest, JobStatus};
pub use validate::validate_request;
