//! Progress snapshots recorded on a job and carried by progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use crate::pipeline::StageId;

/// Open details payload. The engine only reads and writes the well-known
/// keys; anything else rides along in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    /// 1-based position of the entity in the processing set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_entities: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProgressDetails {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn for_entity(entity: &Entity, index: usize, total: usize) -> Self {
        Self {
            entity_id: Some(entity.id.clone()),
            entity_name: Some(entity.name.clone()),
            entity_index: Some(index),
            total_entities: Some(total),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Latest known position of a job within the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub step: StageId,
    #[serde(rename = "progress")]
    pub percent: f64,
    #[serde(default)]
    pub details: ProgressDetails,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(step: StageId, percent: f64, details: ProgressDetails) -> Self {
        Self {
            step,
            percent: percent.clamp(0.0, 100.0),
            details,
            timestamp: Utc::now(),
        }
    }
}
