//! Job records as held by the job store and returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::progress::ProgressSnapshot;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a submitted job. Immutable once the job is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobRequest {
    /// Industry keyword (e.g. "roofing").
    pub industry: String,
    /// City name.
    pub city: String,
    /// State or region abbreviation.
    pub state: String,
    /// Maximum number of entities to process after filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Pre-supplied processing set. When present, discovery, detection and
    /// filtering are skipped and the list is processed verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
}

impl JobRequest {
    pub fn new(industry: &str, city: &str, state: &str) -> Self {
        Self {
            industry: industry.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            limit: None,
            entities: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = Some(entities);
        self
    }
}

/// An artifact produced for one entity (a rendered site).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub artifact_id: String,
    pub entity_id: String,
    pub entity_name: String,
    /// Where the rendered output lives (path or URL).
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(artifact_id: &str, entity: &Entity, location: &str) -> Self {
        Self {
            artifact_id: artifact_id.to_string(),
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            location: location.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// One pipeline execution. Serialized as-is for callers (the job view).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: String,
    pub status: JobStatus,
    pub request: JobRequest,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(default)]
    pub results: Vec<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: String, request: JobRequest) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            request,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: None,
            results: Vec::new(),
            error: None,
        }
    }

    /// Last published percent, or 0 before the first progress update.
    pub fn percent(&self) -> f64 {
        self.progress.as_ref().map(|p| p.percent).unwrap_or(0.0)
    }
}
