//! Events streamed to job subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobStatus, ProgressSnapshot};

/// A notification pushed to the subscribers of one job.
///
/// Serialized with a `type` tag of `log`, `progress` or `connected`; progress
/// events carry the snapshot fields (`step`, `progress`, `details`,
/// `timestamp`) inline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Log {
        job_id: String,
        timestamp: DateTime<Utc>,
        level: String,
        message: String,
        /// Target of the log statement that produced this event.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logger: Option<String>,
    },
    Progress {
        job_id: String,
        #[serde(flatten)]
        snapshot: ProgressSnapshot,
    },
    Connected {
        job_id: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<JobStatus>,
    },
}

impl Event {
    pub fn log(job_id: &str, level: &str, message: &str) -> Self {
        Event::Log {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
            logger: None,
        }
    }

    pub fn log_from(job_id: &str, level: &str, logger: &str, message: &str) -> Self {
        Event::Log {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
            logger: Some(logger.to_string()),
        }
    }

    pub fn progress(job_id: &str, snapshot: ProgressSnapshot) -> Self {
        Event::Progress {
            job_id: job_id.to_string(),
            snapshot,
        }
    }

    pub fn connected(job_id: &str, status: Option<JobStatus>) -> Self {
        Event::Connected {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
            status,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Event::Log { job_id, .. }
            | Event::Progress { job_id, .. }
            | Event::Connected { job_id, .. } => job_id,
        }
    }

    pub fn as_progress(&self) -> Option<&ProgressSnapshot> {
        match self {
            Event::Progress { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }
}
