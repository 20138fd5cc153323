use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument, Level};

use crate::broadcast::JobStore;
use crate::config::schema::EntityFailurePolicy;
use crate::error::JobError;
use crate::job::{Artifact, Entity, Job, JobRequest, JobStatus, ProgressDetails};

use super::config::PipelineConfig;
use super::context::EntityContext;
use super::error::PipelineError;
use super::progress::{ProgressTracker, Publisher};
use super::stage::{BulkStage, EntityStage, PipelineStages, StageId};

/// How a run ended, short of an error.
enum Outcome {
    Completed { total: usize, message: String },
    Cancelled,
}

/// Result of the bulk stages.
enum Prepared {
    Ready {
        entities: Vec<Entity>,
        population: Arc<Vec<Entity>>,
    },
    Finished(Outcome),
}

/// Drives one job at a time from `Pending` to a terminal status.
///
/// The engine holds no per-job state, so one instance can run any number of
/// jobs concurrently.
pub struct PipelineEngine {
    stages: PipelineStages,
    config: Arc<PipelineConfig>,
    store: Arc<JobStore>,
    publisher: Arc<dyn Publisher>,
}

impl PipelineEngine {
    pub fn new(
        stages: PipelineStages,
        config: Arc<PipelineConfig>,
        store: Arc<JobStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            stages,
            config,
            store,
            publisher,
        }
    }

    /// Runs the job to completion and returns its final record.
    ///
    /// Everything runs inside a `job` span carrying the job id, so log output
    /// from stages is routed to the job's subscribers. The span is entered
    /// only while the future is polled.
    pub async fn run(&self, job_id: &str, cancel: CancellationToken) -> Result<Job, PipelineError> {
        let span = info_span!("job", job_id = %job_id);
        self.run_job(job_id, cancel).instrument(span).await
    }

    async fn run_job(&self, job_id: &str, cancel: CancellationToken) -> Result<Job, PipelineError> {
        let job = match self.store.update_status(job_id, JobStatus::Running, None) {
            Ok(job) => job,
            Err(JobError::InvalidTransition {
                from: JobStatus::Cancelled,
                ..
            }) => {
                tracing::info!(parent: None, job_id, "Job was cancelled before it started");
                return Ok(self.store.get(job_id)?);
            }
            Err(e) => return Err(e.into()),
        };

        let mut tracker =
            ProgressTracker::new(job_id, Arc::clone(&self.store), Arc::clone(&self.publisher));
        tracker.log(
            Level::INFO,
            &format!(
                "Starting job for {} businesses in {}, {}",
                job.request.industry, job.request.city, job.request.state
            ),
        );

        let outcome = self.drive(&job, &mut tracker, &cancel).await;
        let percent = tracker.last_percent();

        match outcome {
            Ok(Outcome::Completed { total, message }) => {
                let produced = self.store.get(job_id)?.results.len();
                tracker.log(Level::INFO, &message);
                let details = ProgressDetails {
                    total_entities: Some(total),
                    ..ProgressDetails::message(message)
                }
                .with("results", produced);
                tracker.finish(
                    JobStatus::Completed,
                    StageId::Completed,
                    100.0,
                    details,
                    None,
                )
            }
            Ok(Outcome::Cancelled) => {
                tracker.log(Level::WARN, "Job cancelled");
                tracker.finish(
                    JobStatus::Cancelled,
                    StageId::Cancelled,
                    percent,
                    ProgressDetails::message("Job cancelled"),
                    None,
                )
            }
            Err(err) => {
                let message = err.to_string();
                tracker.log(Level::ERROR, &format!("Job failed: {}", message));
                tracker.finish(
                    JobStatus::Failed,
                    StageId::Failed,
                    percent,
                    ProgressDetails::message(message.clone()),
                    Some(message),
                )
            }
        }
    }

    async fn drive(
        &self,
        job: &Job,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        let request = Arc::new(job.request.clone());

        let (entities, population) = match &request.entities {
            Some(supplied) => {
                tracker.log(
                    Level::INFO,
                    &format!("Processing {} supplied businesses", supplied.len()),
                );
                (supplied.clone(), Arc::new(supplied.clone()))
            }
            None => match self.prepare(&request, tracker, cancel).await? {
                Prepared::Ready {
                    entities,
                    population,
                } => (entities, population),
                Prepared::Finished(outcome) => return Ok(outcome),
            },
        };

        self.process_all(&job.id, request, entities, population, tracker, cancel)
            .await
    }

    /// Discovery, detection and filtering.
    async fn prepare(
        &self,
        request: &JobRequest,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Prepared, PipelineError> {
        // Discovery
        if cancel.is_cancelled() {
            return Ok(Prepared::Finished(Outcome::Cancelled));
        }
        let discovered = self
            .run_bulk(
                StageId::DiscoveringEntities,
                self.stages.discovery.as_ref(),
                request,
                Vec::new(),
                tracker,
                format!(
                    "Discovering {} businesses in {}, {}...",
                    request.industry, request.city, request.state
                ),
            )
            .await?;
        let found = discovered.len();
        tracker.report(
            StageId::DiscoveringEntities,
            bulk_end(StageId::DiscoveringEntities),
            ProgressDetails::message(format!("Found {} businesses", found))
                .with("entities_found", found),
        )?;
        if discovered.is_empty() {
            return Ok(Prepared::Finished(Outcome::Completed {
                total: 0,
                message: "No businesses found".to_string(),
            }));
        }

        // Detection
        if cancel.is_cancelled() {
            return Ok(Prepared::Finished(Outcome::Cancelled));
        }
        let detected = self
            .run_bulk(
                StageId::DetectingTargets,
                self.stages.detection.as_ref(),
                request,
                discovered,
                tracker,
                format!("Checking which of {} businesses already have websites...", found),
            )
            .await?;
        let with_sites = detected.iter().filter(|e| e.has_target_artifact).count();
        tracker.report(
            StageId::DetectingTargets,
            bulk_end(StageId::DetectingTargets),
            ProgressDetails::message(format!(
                "{} of {} businesses already have websites",
                with_sites,
                detected.len()
            ))
            .with("with_target", with_sites),
        )?;

        // Filtering
        if cancel.is_cancelled() {
            return Ok(Prepared::Finished(Outcome::Cancelled));
        }
        let population = Arc::new(detected);
        let mut remaining = self
            .run_bulk(
                StageId::FilteringEntities,
                self.stages.filter.as_ref(),
                request,
                population.as_ref().clone(),
                tracker,
                "Filtering businesses that need websites...".to_string(),
            )
            .await?;
        if let Some(limit) = self.config.effective_limit(request.limit) {
            if remaining.len() > limit {
                debug!("Limiting {} businesses to {}", remaining.len(), limit);
                remaining.truncate(limit);
            }
        }
        tracker.report(
            StageId::FilteringEntities,
            bulk_end(StageId::FilteringEntities),
            ProgressDetails::message(format!("{} businesses need websites", remaining.len()))
                .with("entities_remaining", remaining.len()),
        )?;
        if remaining.is_empty() {
            return Ok(Prepared::Finished(Outcome::Completed {
                total: 0,
                message: "All businesses already have websites".to_string(),
            }));
        }

        Ok(Prepared::Ready {
            entities: remaining,
            population,
        })
    }

    async fn process_all(
        &self,
        job_id: &str,
        request: Arc<JobRequest>,
        entities: Vec<Entity>,
        population: Arc<Vec<Entity>>,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        let total = entities.len();
        if total == 0 {
            return Ok(Outcome::Completed {
                total: 0,
                message: "No businesses to process".to_string(),
            });
        }

        let mut produced = 0;
        for (position, entity) in entities.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let index = position + 1;
            let name = entity.name.clone();
            let details = ProgressDetails::for_entity(&entity, index, total);
            let span = info_span!("entity", entity_id = %entity.id, index);
            let ctx = EntityContext::new(
                job_id,
                Arc::clone(&request),
                entity,
                index,
                total,
                Arc::clone(&population),
            );

            match self.process_entity(ctx, tracker).instrument(span).await {
                Ok(artifact) => {
                    self.store.append_result(job_id, artifact.clone())?;
                    produced += 1;
                    tracker.report(
                        StageId::EntityCompleted,
                        entity_percent(StageId::EntityCompleted, position, total),
                        details
                            .with_message(format!("Website ready for {}", name))
                            .with("artifact_id", artifact.artifact_id)
                            .with("location", artifact.location),
                    )?;
                }
                Err(err)
                    if err.is_entity_scoped()
                        && self.config.entity_failure_policy == EntityFailurePolicy::Continue =>
                {
                    tracker.log(
                        Level::ERROR,
                        &format!("Failed to process {} ({}/{}): {}", name, index, total, err),
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Outcome::Completed {
            total,
            message: format!("Generated {} of {} websites", produced, total),
        })
    }

    /// Runs the per-entity stages for one entity and returns its artifact.
    async fn process_entity(
        &self,
        mut ctx: EntityContext,
        tracker: &mut ProgressTracker,
    ) -> Result<Artifact, PipelineError> {
        let position = ctx.index - 1;
        let total = ctx.total;
        let name = ctx.entity.name.clone();
        let details = ProgressDetails::for_entity(&ctx.entity, ctx.index, total);
        let percent = |step: StageId| entity_percent(step, position, total);

        tracker.report(
            StageId::ProcessingEntity,
            percent(StageId::ProcessingEntity),
            details
                .clone()
                .with_message(format!("Processing {} ({}/{})", name, ctx.index, total)),
        )?;

        tracker.report(
            StageId::FindingReferences,
            percent(StageId::FindingReferences),
            details
                .clone()
                .with_message(format!("Finding competitors for {}...", name)),
        )?;
        ctx = self
            .run_entity(StageId::FindingReferences, self.stages.references.as_ref(), ctx)
            .await?;

        let reference_count = ctx.references.len();
        tracker.report(
            StageId::AnalyzingReferences,
            percent(StageId::AnalyzingReferences),
            details
                .clone()
                .with_message(format!("Analyzing {} competitors...", reference_count))
                .with("references_count", reference_count),
        )?;
        if reference_count == 0 {
            debug!("No competitors found for {}, skipping analysis", name);
        } else if self.config.tolerate_analysis_failure {
            let fallback = ctx.clone();
            ctx = match self
                .run_entity(StageId::AnalyzingReferences, self.stages.analyzer.as_ref(), ctx)
                .await
            {
                Ok(analyzed) => analyzed,
                Err(err) => {
                    tracker.log(
                        Level::WARN,
                        &format!("Continuing without competitor analysis: {}", err),
                    );
                    fallback
                }
            };
        } else {
            ctx = self
                .run_entity(StageId::AnalyzingReferences, self.stages.analyzer.as_ref(), ctx)
                .await?;
        }

        tracker.report(
            StageId::GeneratingContent,
            percent(StageId::GeneratingContent),
            details
                .clone()
                .with_message(format!("Generating website content for {}...", name)),
        )?;
        ctx = self
            .run_entity(StageId::GeneratingContent, self.stages.generator.as_ref(), ctx)
            .await?;

        tracker.report(
            StageId::RenderingArtifact,
            percent(StageId::RenderingArtifact),
            details.with_message(format!("Building website for {}...", name)),
        )?;
        ctx = self
            .run_entity(StageId::RenderingArtifact, self.stages.renderer.as_ref(), ctx)
            .await?;

        match ctx.artifact {
            Some(artifact) => Ok(artifact),
            None => Err(PipelineError::MissingArtifact(name)),
        }
    }

    async fn run_bulk(
        &self,
        step: StageId,
        stage: &dyn BulkStage,
        request: &JobRequest,
        entities: Vec<Entity>,
        tracker: &mut ProgressTracker,
        message: String,
    ) -> Result<Vec<Entity>, PipelineError> {
        tracker.report(step, bulk_start(step), ProgressDetails::message(message))?;
        stage
            .execute(request, entities)
            .instrument(info_span!("stage", step = %step))
            .await
            .map_err(|source| PipelineError::BulkStage {
                stage: step,
                source,
            })
    }

    async fn run_entity(
        &self,
        step: StageId,
        stage: &dyn EntityStage,
        ctx: EntityContext,
    ) -> Result<EntityContext, PipelineError> {
        let entity = ctx.entity.name.clone();
        stage
            .execute(ctx)
            .instrument(info_span!("stage", step = %step))
            .await
            .map_err(|source| PipelineError::EntityStage {
                stage: step,
                entity,
                source,
            })
    }
}

fn bulk_start(step: StageId) -> f64 {
    step.bulk_range().map(|(start, _)| start).unwrap_or(0.0)
}

fn bulk_end(step: StageId) -> f64 {
    step.bulk_range().map(|(_, end)| end).unwrap_or(0.0)
}

fn entity_percent(step: StageId, position: usize, total: usize) -> f64 {
    step.entity_percent(position, total).unwrap_or(0.0)
}
