//! Stages the engine ships with.

use std::cmp::Ordering;

use async_trait::async_trait;

use super::context::EntityContext;
use super::error::StageError;
use super::stage::{BulkStage, EntityStage};
use crate::job::{Entity, JobRequest};

/// Drops entities that already have the target artifact.
pub struct TargetArtifactFilter;

#[async_trait]
impl BulkStage for TargetArtifactFilter {
    async fn execute(
        &self,
        _request: &JobRequest,
        entities: Vec<Entity>,
    ) -> Result<Vec<Entity>, StageError> {
        let before = entities.len();
        let remaining: Vec<Entity> = entities
            .into_iter()
            .filter(|e| !e.has_target_artifact)
            .collect();
        log::debug!(
            "Filtered {} of {} entities that already have a site",
            before - remaining.len(),
            before
        );
        Ok(remaining)
    }
}

/// Picks the best-rated entities in the same market that already have the
/// target artifact, to serve as references for the one being processed.
pub struct MarketReferenceFinder {
    max_references: usize,
}

impl MarketReferenceFinder {
    pub const DEFAULT_MAX_REFERENCES: usize = 5;

    pub fn new(max_references: usize) -> Self {
        Self { max_references }
    }

    /// Candidates from `population`, best first.
    pub fn select(&self, ctx: &EntityContext) -> Vec<Entity> {
        let (industry, city, state) = ctx.market();
        let mut candidates: Vec<Entity> = ctx
            .population
            .iter()
            .filter(|c| c.id != ctx.entity.id)
            .filter(|c| c.has_target_artifact)
            .filter(|c| c.same_market(industry, city, state))
            .cloned()
            .collect();

        candidates.sort_by(|a, b| by_reputation(b, a));
        candidates.truncate(self.max_references);
        candidates
    }
}

impl Default for MarketReferenceFinder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_REFERENCES)
    }
}

/// Rating first, then review count. Unrated entities sort last.
fn by_reputation(a: &Entity, b: &Entity) -> Ordering {
    let rating = |e: &Entity| e.rating.unwrap_or(0.0);
    rating(a)
        .total_cmp(&rating(b))
        .then(a.review_count.cmp(&b.review_count))
}

#[async_trait]
impl EntityStage for MarketReferenceFinder {
    async fn execute(&self, mut ctx: EntityContext) -> Result<EntityContext, StageError> {
        ctx.references = self.select(&ctx);
        log::debug!(
            "Found {} references for {}",
            ctx.references.len(),
            ctx.entity.name
        );
        Ok(ctx)
    }
}
