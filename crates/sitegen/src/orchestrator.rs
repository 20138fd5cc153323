//! The boundary API: submit, inspect, cancel and follow jobs.

use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::broadcast::{Event, EventBus, JobLogLayer, JobStore, Subscriber};
use crate::config::{apply_env_overrides, load_config, Config};
use crate::error::{ConfigError, JobError};
use crate::job::{validate_request, Job, JobRequest, JobStatus, ProgressDetails, ProgressSnapshot};
use crate::pipeline::{
    PipelineConfig, PipelineEngine, PipelineError, PipelineStages, PipelineStagesBuilder, StageId,
};

/// Bookkeeping for a job whose engine task has not yet been reaped.
struct ActiveJob {
    cancel: CancellationToken,
    finished: watch::Receiver<bool>,
}

type ActiveJobs = Arc<RwLock<HashMap<String, ActiveJob>>>;

fn read_active(active: &ActiveJobs) -> RwLockReadGuard<'_, HashMap<String, ActiveJob>> {
    match active.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Active job table lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_active(active: &ActiveJobs) -> RwLockWriteGuard<'_, HashMap<String, ActiveJob>> {
    match active.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Active job table lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Runs jobs as independent tokio tasks and exposes their state and events.
///
/// Cloning is cheap; clones share the same store, bus and engine.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<JobStore>,
    bus: EventBus,
    engine: Arc<PipelineEngine>,
    active: ActiveJobs,
    forward_level: Level,
}

impl Orchestrator {
    /// Builds an orchestrator from configuration with a fresh store and bus.
    pub fn new(config: &Config, stages: PipelineStagesBuilder) -> Result<Self, ConfigError> {
        let stages = stages
            .max_references(config.pipeline.max_references)
            .build()?;
        let forward_level =
            config
                .log
                .forward_level
                .parse::<Level>()
                .map_err(|_| ConfigError::Validation {
                    message: format!(
                        "log.forward_level '{}' is not a log level",
                        config.log.forward_level
                    ),
                })?;

        Ok(Self::with_parts(
            stages,
            PipelineConfig::from_config(config),
            Arc::new(JobStore::new()),
            EventBus::new(),
            forward_level,
        ))
    }

    /// Loads the config file at `path`, applies `SITEGEN_*` overrides and
    /// builds an orchestrator from the result.
    pub fn from_config_file<P: AsRef<Path>>(
        path: P,
        stages: PipelineStagesBuilder,
    ) -> crate::Result<Self> {
        let config = apply_env_overrides(load_config(path)?)?;
        Ok(Self::new(&config, stages)?)
    }

    /// Assembles an orchestrator around existing components.
    pub fn with_parts(
        stages: PipelineStages,
        pipeline: PipelineConfig,
        store: Arc<JobStore>,
        bus: EventBus,
        forward_level: Level,
    ) -> Self {
        let engine = PipelineEngine::new(
            stages,
            Arc::new(pipeline),
            Arc::clone(&store),
            Arc::new(bus.clone()),
        );
        Self {
            store,
            bus,
            engine: Arc::new(engine),
            active: Arc::new(RwLock::new(HashMap::new())),
            forward_level,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// A tracing layer that forwards job-scoped log output to this
    /// orchestrator's subscribers.
    pub fn log_layer(&self) -> JobLogLayer {
        JobLogLayer::new(self.bus.clone(), self.forward_level)
    }

    /// Validates the request, creates a pending job and starts its engine
    /// task. Returns as soon as the job is registered.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: JobRequest) -> Result<String, JobError> {
        validate_request(&request)?;

        let job = self.store.create(request);
        let job_id = job.id.clone();
        let cancel = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(false);

        write_active(&self.active).insert(
            job_id.clone(),
            ActiveJob {
                cancel: cancel.clone(),
                finished: finished_rx,
            },
        );

        let engine = Arc::clone(&self.engine);
        let run_id = job_id.clone();
        let handle = tokio::spawn(async move { engine.run(&run_id, cancel).await });

        tokio::spawn(supervise(
            job_id.clone(),
            handle,
            Arc::clone(&self.store),
            self.bus.clone(),
            Arc::clone(&self.active),
            finished_tx,
        ));

        info!(
            "Submitted job {} ({} in {}, {})",
            job_id, job.request.industry, job.request.city, job.request.state
        );
        Ok(job_id)
    }

    pub fn get(&self, job_id: &str) -> Result<Job, JobError> {
        self.store.get(job_id)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        self.store.list()
    }

    pub fn list_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.store.list_by_status(status)
    }

    pub fn counts(&self) -> HashMap<JobStatus, usize> {
        self.store.counts()
    }

    /// Requests cancellation.
    ///
    /// A pending job is cancelled immediately. A running job stops at its
    /// next checkpoint; if it has none left it may still complete.
    pub fn cancel(&self, job_id: &str) -> Result<(), JobError> {
        if let Some(active) = read_active(&self.active).get(job_id) {
            active.cancel.cancel();
        }

        if self.store.cancel_if_pending(job_id)? {
            let job = self.store.get(job_id)?;
            info!("Cancelled pending job {}", job_id);
            self.bus
                .publish(job_id, Event::log(job_id, "WARN", "Job cancelled before it started"));
            if let Some(snapshot) = job.progress {
                self.bus.publish(job_id, Event::progress(job_id, snapshot));
            }
            self.bus.close(job_id);
        } else {
            info!("Cancellation requested for running job {}", job_id);
        }
        Ok(())
    }

    /// Attaches a listener. The first event is `Connected`; the stream ends
    /// once the job reaches a terminal status.
    pub fn subscribe(&self, job_id: &str) -> Result<Subscriber, JobError> {
        let status = self.store.status(job_id)?;
        Ok(self.bus.subscribe(job_id, Some(status)))
    }

    pub fn unsubscribe(&self, subscriber: Subscriber) {
        self.bus.unsubscribe(subscriber);
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.bus.subscriber_count(job_id)
    }

    /// Removes a finished job and everything kept for it.
    pub fn delete(&self, job_id: &str) -> Result<Job, JobError> {
        let job = self.store.delete(job_id)?;
        self.bus.forget(job_id);
        debug!("Deleted job {}", job_id);
        Ok(job)
    }

    /// Waits until the job's engine task has been reaped and returns the
    /// final record.
    pub async fn wait(&self, job_id: &str) -> Result<Job, JobError> {
        let finished = read_active(&self.active)
            .get(job_id)
            .map(|active| active.finished.clone());

        if let Some(mut finished) = finished {
            // Err only means the supervisor is gone, which also means done.
            let _ = finished.wait_for(|done| *done).await;
        }

        self.store.get(job_id)
    }
}

/// Awaits an engine task and settles the job if the task did not.
async fn supervise(
    job_id: String,
    handle: JoinHandle<Result<Job, PipelineError>>,
    store: Arc<JobStore>,
    bus: EventBus,
    active: ActiveJobs,
    finished: watch::Sender<bool>,
) {
    match handle.await {
        Ok(Ok(job)) => {
            debug!("Job {} finished with status {}", job_id, job.status);
        }
        Ok(Err(err)) => {
            error!("Job {} ended with an engine error: {}", job_id, err);
            fail_job(&store, &bus, &job_id, &err.to_string());
        }
        Err(join_err) if join_err.is_panic() => {
            let err = PipelineError::Panicked(panic_message(join_err.into_panic()));
            error!("Job {} panicked: {}", job_id, err);
            fail_job(&store, &bus, &job_id, &err.to_string());
        }
        Err(join_err) => {
            warn!("Job {} task was aborted: {}", job_id, join_err);
            fail_job(&store, &bus, &job_id, &join_err.to_string());
        }
    }

    write_active(&active).remove(&job_id);
    let _ = finished.send(true);
}

/// Marks a job failed unless it already reached a terminal status, then
/// ends its streams.
fn fail_job(store: &JobStore, bus: &EventBus, job_id: &str, message: &str) {
    let snapshot = ProgressSnapshot::new(StageId::Failed, 0.0, ProgressDetails::message(message));
    match store.finish(job_id, JobStatus::Failed, Some(message.to_string()), snapshot) {
        Ok((_, stored)) => {
            bus.publish(job_id, Event::log(job_id, "ERROR", message));
            bus.publish(job_id, Event::progress(job_id, stored));
        }
        Err(e) => debug!("Job {} was already settled: {}", job_id, e),
    }
    bus.close(job_id);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
