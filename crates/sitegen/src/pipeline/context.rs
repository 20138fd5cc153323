use std::sync::Arc;

use serde_json::Value;

use crate::job::{Artifact, Entity, JobRequest};

/// Accumulated state of one entity's trip through the per-entity stages.
///
/// Each stage receives the context by value and returns it with its own
/// field filled in.
#[derive(Debug, Clone)]
pub struct EntityContext {
    pub job_id: String,
    pub request: Arc<JobRequest>,

    /// The entity being processed.
    pub entity: Entity,
    /// 1-based position in the processing set.
    pub index: usize,
    pub total: usize,

    /// Every entity known to the job after detection, including those
    /// dropped by filtering. Reference finding picks from here.
    pub population: Arc<Vec<Entity>>,

    // finding_references
    pub references: Vec<Entity>,

    // analyzing_references; None when skipped or tolerated failure
    pub analysis: Option<Value>,

    // generating_content
    pub content: Option<Value>,

    // rendering_artifact, required for the entity to count as produced
    pub artifact: Option<Artifact>,
}

impl EntityContext {
    pub fn new(
        job_id: &str,
        request: Arc<JobRequest>,
        entity: Entity,
        index: usize,
        total: usize,
        population: Arc<Vec<Entity>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            request,
            entity,
            index,
            total,
            population,
            references: Vec::new(),
            analysis: None,
            content: None,
            artifact: None,
        }
    }

    /// Industry, city and state the entity competes in, falling back to the
    /// request when the entity does not carry its own.
    pub fn market(&self) -> (&str, &str, Option<&str>) {
        let industry = if self.entity.industry.is_empty() {
            self.request.industry.as_str()
        } else {
            self.entity.industry.as_str()
        };
        let city = if self.entity.city.is_empty() {
            self.request.city.as_str()
        } else {
            self.entity.city.as_str()
        };
        let state = self
            .entity
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(Some(self.request.state.as_str()));
        (industry, city, state)
    }
}
