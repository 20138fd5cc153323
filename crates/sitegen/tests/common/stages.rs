//! Scriptable stand-ins for the external collaborators.
//!
//! Each stage records what it saw so tests can assert on call order and
//! counts without touching the network.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use sitegen::{Artifact, BulkStage, Entity, EntityContext, EntityStage, JobRequest, StageError};

/// Returns a fixed entity list, or fails.
pub struct StaticDiscovery {
    entities: Vec<Entity>,
    failure: Option<String>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticDiscovery {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self {
            entities,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            entities: Vec::new(),
            failure: Some(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl BulkStage for StaticDiscovery {
    async fn execute(
        &self,
        _request: &JobRequest,
        _entities: Vec<Entity>,
    ) -> Result<Vec<Entity>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(StageError::Upstream(message.clone())),
            None => Ok(self.entities.clone()),
        }
    }
}

/// Passes entities through unchanged. Flags set by the test builders are
/// treated as already detected.
pub struct Passthrough;

#[async_trait]
impl BulkStage for Passthrough {
    async fn execute(
        &self,
        _request: &JobRequest,
        entities: Vec<Entity>,
    ) -> Result<Vec<Entity>, StageError> {
        Ok(entities)
    }
}

#[async_trait]
impl EntityStage for Passthrough {
    async fn execute(&self, ctx: EntityContext) -> Result<EntityContext, StageError> {
        Ok(ctx)
    }
}

/// Writes a small analysis value, or fails every time.
pub struct Analyzer {
    fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl EntityStage for Analyzer {
    async fn execute(&self, mut ctx: EntityContext) -> Result<EntityContext, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StageError::Upstream("scraper timed out".to_string()));
        }
        ctx.analysis = Some(serde_json::json!({ "competitors": ctx.references.len() }));
        Ok(ctx)
    }
}

/// Generates placeholder content and fails for selected entity ids.
pub struct Generator {
    fail_for: HashSet<String>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl Generator {
    pub fn new() -> Self {
        Self {
            fail_for: HashSet::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            fail_for: ids.iter().map(|id| id.to_string()).collect(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl EntityStage for Generator {
    async fn execute(&self, mut ctx: EntityContext) -> Result<EntityContext, StageError> {
        self.seen.lock().unwrap().push(ctx.entity.id.clone());
        if self.fail_for.contains(&ctx.entity.id) {
            return Err(StageError::failed(format!(
                "content model rejected {}",
                ctx.entity.name
            )));
        }
        ctx.content = Some(serde_json::json!({ "headline": ctx.entity.name }));
        Ok(ctx)
    }
}

/// Produces an artifact per entity.
pub struct Renderer;

#[async_trait]
impl EntityStage for Renderer {
    async fn execute(&self, mut ctx: EntityContext) -> Result<EntityContext, StageError> {
        let artifact_id = format!("site-{}", ctx.entity.id);
        let location = format!("/tmp/sites/{}", ctx.entity.id);
        ctx.artifact = Some(Artifact::new(&artifact_id, &ctx.entity, &location));
        Ok(ctx)
    }
}

/// Holds the first entity until released, so a test can act while the job
/// is known to be mid-flight.
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl EntityStage for Gate {
    async fn execute(&self, ctx: EntityContext) -> Result<EntityContext, StageError> {
        if ctx.index == 1 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(ctx)
    }
}

/// Panics inside the engine task.
pub struct Panicking;

#[async_trait]
impl EntityStage for Panicking {
    async fn execute(&self, _ctx: EntityContext) -> Result<EntityContext, StageError> {
        panic!("renderer exploded");
    }
}

/// Emits log output through both `tracing` and `log`.
pub struct Chatty;

#[async_trait]
impl EntityStage for Chatty {
    async fn execute(&self, ctx: EntityContext) -> Result<EntityContext, StageError> {
        tracing::info!(target: "stages::generator", "Prompting model for {}", ctx.entity.name);
        log::warn!(target: "stages::scraper", "Slow response for {}", ctx.entity.name);
        tracing::debug!("Prompt details for {}", ctx.entity.name);
        Ok(ctx)
    }
}
