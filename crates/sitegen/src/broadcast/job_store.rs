//! In-memory job registry.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::JobError;
use crate::job::{Artifact, Job, JobRequest, JobStatus, ProgressDetails, ProgressSnapshot};
use crate::pipeline::StageId;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn new_job_id() -> String {
    format!("job-{}", uuid::Uuid::new_v4().simple())
}

/// Applies a status change to a record in place. Every field that belongs to
/// the transition is written here so readers never see half of it.
fn transition(job: &mut Job, next: JobStatus, error: Option<String>) -> Result<(), JobError> {
    if !job.status.can_transition_to(next) {
        return Err(JobError::InvalidTransition {
            job_id: job.id.clone(),
            from: job.status,
            to: next,
        });
    }

    let now = Utc::now();
    job.status = next;
    if next == JobStatus::Running {
        job.started_at = Some(now);
    }
    if next.is_terminal() {
        job.completed_at = Some(now);
    }
    if error.is_some() {
        job.error = error;
    }
    Ok(())
}

/// Keeps published percent non-decreasing for the lifetime of a job.
fn monotonic(job: &Job, mut snapshot: ProgressSnapshot) -> ProgressSnapshot {
    let floor = job.percent();
    if snapshot.percent < floor {
        snapshot.percent = floor;
    }
    snapshot
}

// ─── JobStore ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, Job>,
    /// Job ids in creation order.
    order: Vec<String>,
}

impl Registry {
    fn job_mut(&mut self, job_id: &str) -> Result<&mut Job, JobError> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }
}

/// Authoritative store of job records.
///
/// A single `std::sync::RwLock` guards the registry; every mutation happens
/// under one write guard, so readers always observe whole records. Locks are
/// never held across an await point.
pub struct JobStore {
    registry: RwLock<Registry>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        match self.registry.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        match self.registry.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Creates a pending job with a fresh id.
    pub fn create(&self, request: JobRequest) -> Job {
        let job = Job::new(new_job_id(), request);
        let mut registry = self.write();
        registry.order.push(job.id.clone());
        registry.jobs.insert(job.id.clone(), job.clone());
        job
    }

    pub fn get(&self, job_id: &str) -> Result<Job, JobError> {
        self.read()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus, JobError> {
        self.read()
            .jobs
            .get(job_id)
            .map(|job| job.status)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Returns all jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        let registry = self.read();
        registry
            .order
            .iter()
            .rev()
            .filter_map(|id| registry.jobs.get(id).cloned())
            .collect()
    }

    /// Returns jobs with the given status, newest first.
    pub fn list_by_status(&self, status: JobStatus) -> Vec<Job> {
        let registry = self.read();
        registry
            .order
            .iter()
            .rev()
            .filter_map(|id| registry.jobs.get(id))
            .filter(|job| job.status == status)
            .cloned()
            .collect()
    }

    /// Moves a job along the state machine.
    pub fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job, JobError> {
        let mut registry = self.write();
        let job = registry.job_mut(job_id)?;
        transition(job, status, error)?;
        Ok(job.clone())
    }

    /// Cancels the job only if no engine has picked it up yet.
    ///
    /// Returns `Ok(true)` when the job went `Pending -> Cancelled` (with a
    /// final `cancelled` snapshot),
    /// `Ok(false)` when it is already running, and `AlreadyTerminal` when it
    /// has finished.
    pub fn cancel_if_pending(&self, job_id: &str) -> Result<bool, JobError> {
        let mut registry = self.write();
        let job = registry.job_mut(job_id)?;
        match job.status {
            JobStatus::Pending => {
                transition(job, JobStatus::Cancelled, None)?;
                job.progress = Some(ProgressSnapshot::new(
                    StageId::Cancelled,
                    0.0,
                    ProgressDetails::message("Job cancelled before it started"),
                ));
                Ok(true)
            }
            JobStatus::Running => Ok(false),
            status => Err(JobError::AlreadyTerminal {
                job_id: job_id.to_string(),
                status,
            }),
        }
    }

    /// Appends an artifact. Results are frozen outside `Running`.
    pub fn append_result(&self, job_id: &str, artifact: Artifact) -> Result<(), JobError> {
        let mut registry = self.write();
        let job = registry.job_mut(job_id)?;
        if job.status != JobStatus::Running {
            return Err(JobError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: job.status,
            });
        }
        job.results.push(artifact);
        Ok(())
    }

    /// Records a new progress snapshot and returns it as stored.
    ///
    /// Percent never goes backwards; a smaller value is raised to the last
    /// recorded one. Terminal jobs keep their final snapshot.
    pub fn apply_progress(
        &self,
        job_id: &str,
        snapshot: ProgressSnapshot,
    ) -> Result<ProgressSnapshot, JobError> {
        let mut registry = self.write();
        let job = registry.job_mut(job_id)?;
        if job.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        let snapshot = monotonic(job, snapshot);
        job.progress = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Terminal transition with its final snapshot, in one write.
    pub fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        snapshot: ProgressSnapshot,
    ) -> Result<(Job, ProgressSnapshot), JobError> {
        let mut registry = self.write();
        let job = registry.job_mut(job_id)?;
        if !status.is_terminal() {
            return Err(JobError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: status,
            });
        }
        transition(job, status, error)?;
        let snapshot = monotonic(job, snapshot);
        job.progress = Some(snapshot.clone());
        Ok((job.clone(), snapshot))
    }

    /// Removes a finished job.
    pub fn delete(&self, job_id: &str) -> Result<Job, JobError> {
        let mut registry = self.write();
        let status = registry.job_mut(job_id)?.status;
        if !status.is_terminal() {
            return Err(JobError::InvalidTransition {
                job_id: job_id.to_string(),
                from: status,
                to: status,
            });
        }
        registry.order.retain(|id| id != job_id);
        registry
            .jobs
            .remove(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Returns the number of jobs per status.
    pub fn counts(&self) -> HashMap<JobStatus, usize> {
        let mut counts: HashMap<JobStatus, usize> =
            JobStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for job in self.read().jobs.values() {
            *counts.entry(job.status).or_default() += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
