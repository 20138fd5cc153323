use std::sync::Arc;

use tracing::Level;

use super::error::PipelineError;
use super::stage::StageId;
use crate::broadcast::{Event, EventBus, JobStore};
use crate::job::{Job, JobStatus, ProgressDetails, ProgressSnapshot};

/// Where the engine sends job events.
pub trait Publisher: Send + Sync {
    fn publish(&self, job_id: &str, event: Event);

    /// Signals that no further events will be published for `job_id`.
    fn close(&self, _job_id: &str) {}
}

impl Publisher for EventBus {
    fn publish(&self, job_id: &str, event: Event) {
        EventBus::publish(self, job_id, event);
    }

    fn close(&self, job_id: &str) {
        EventBus::close(self, job_id);
    }
}

/// No-op publisher for unit tests.
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _job_id: &str, _event: Event) {}
}

/// Records progress for one job and mirrors it to subscribers.
///
/// The store is written before the matching event is published, so a
/// subscriber that reacts to an event always finds the store at least as far
/// along.
pub struct ProgressTracker {
    job_id: String,
    store: Arc<JobStore>,
    publisher: Arc<dyn Publisher>,
    last_percent: f64,
}

impl ProgressTracker {
    pub fn new(job_id: &str, store: Arc<JobStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            job_id: job_id.to_string(),
            store,
            publisher,
            last_percent: 0.0,
        }
    }

    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }

    /// Publishes a progress snapshot. `percent` is raised to the last
    /// reported value if it would go backwards.
    pub fn report(
        &mut self,
        step: StageId,
        percent: f64,
        details: ProgressDetails,
    ) -> Result<(), PipelineError> {
        let snapshot = ProgressSnapshot::new(step, percent.max(self.last_percent), details);
        let stored = self.store.apply_progress(&self.job_id, snapshot)?;
        self.last_percent = stored.percent;
        self.publisher
            .publish(&self.job_id, Event::progress(&self.job_id, stored));
        Ok(())
    }

    /// Publishes a log event and mirrors it to the process log.
    ///
    /// The mirrored event is a root event, so the job log layer does not
    /// forward it a second time.
    pub fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(parent: None, job_id = %self.job_id, "{}", message),
            Level::WARN => tracing::warn!(parent: None, job_id = %self.job_id, "{}", message),
            Level::INFO => tracing::info!(parent: None, job_id = %self.job_id, "{}", message),
            Level::DEBUG => tracing::debug!(parent: None, job_id = %self.job_id, "{}", message),
            _ => tracing::trace!(parent: None, job_id = %self.job_id, "{}", message),
        }
        self.publisher.publish(
            &self.job_id,
            Event::log_from(&self.job_id, level.as_str(), module_path!(), message),
        );
    }

    /// Moves the job into a terminal status, publishes the final snapshot and
    /// closes the job's streams.
    pub fn finish(
        &mut self,
        status: JobStatus,
        step: StageId,
        percent: f64,
        details: ProgressDetails,
        error: Option<String>,
    ) -> Result<Job, PipelineError> {
        let snapshot = ProgressSnapshot::new(step, percent.max(self.last_percent), details);
        let (job, stored) = self.store.finish(&self.job_id, status, error, snapshot)?;
        self.last_percent = stored.percent;
        self.publisher
            .publish(&self.job_id, Event::progress(&self.job_id, stored));
        self.publisher.close(&self.job_id);
        Ok(job)
    }
}
