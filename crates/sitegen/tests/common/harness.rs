//! Test harness wiring an orchestrator to scripted stages.
//!
//! Tests run on the current-thread runtime, so a job does not start until the
//! test first awaits. Subscribing right after `submit` therefore observes the
//! job's complete event stream.

#![allow(dead_code)]

use std::time::Duration;

use sitegen::pipeline::PipelineStagesBuilder;
use sitegen::{Config, Event, Job, Orchestrator, PipelineStages, StageId, Subscriber};

use super::stages::{Analyzer, Generator, Passthrough, Renderer, StaticDiscovery};

const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Stages that succeed for every entity and discover nothing.
pub fn default_stages() -> PipelineStagesBuilder {
    PipelineStages::builder()
        .discovery(StaticDiscovery::new(Vec::new()))
        .detection(Passthrough)
        .analyzer(Analyzer::new())
        .generator(Generator::new())
        .renderer(Renderer)
}

pub struct TestHarness {
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    pub fn new(stages: PipelineStagesBuilder) -> Self {
        Self::with_config(&Config::default(), stages)
    }

    pub fn with_config(config: &Config, stages: PipelineStagesBuilder) -> Self {
        let orchestrator =
            Orchestrator::new(config, stages).expect("Failed to build orchestrator");
        Self { orchestrator }
    }

    /// Submits a request and attaches a subscriber before the job starts.
    pub fn submit_and_subscribe(&self, request: sitegen::JobRequest) -> (String, Subscriber) {
        let job_id = self
            .orchestrator
            .submit(request)
            .expect("Failed to submit job");
        let subscriber = self
            .orchestrator
            .subscribe(&job_id)
            .expect("Failed to subscribe");
        (job_id, subscriber)
    }

    pub async fn wait(&self, job_id: &str) -> Job {
        tokio::time::timeout(STREAM_TIMEOUT, self.orchestrator.wait(job_id))
            .await
            .expect("Job did not finish in time")
            .expect("Job disappeared")
    }
}

/// Drains a subscriber until its stream ends.
pub async fn collect(mut subscriber: Subscriber) -> Vec<Event> {
    tokio::time::timeout(STREAM_TIMEOUT, async move {
        let mut events = Vec::new();
        while let Some(event) = subscriber.recv().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("Event stream did not end in time")
}

pub fn steps(events: &[Event]) -> Vec<StageId> {
    events
        .iter()
        .filter_map(|e| e.as_progress().map(|p| p.step))
        .collect()
}

pub fn percents(events: &[Event]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| e.as_progress().map(|p| p.percent))
        .collect()
}

pub fn log_messages(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Log { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn assert_non_decreasing(values: &[f64]) {
    for pair in values.windows(2) {
        assert!(
            pair[1] >= pair[0],
            "percent went backwards: {} -> {} in {:?}",
            pair[0],
            pair[1],
            values
        );
    }
}
