//! Shared test utilities for sitegen integration tests.
//!
//! This module provides:
//! - `TestHarness` wrapping an `Orchestrator` built from scripted stages
//! - Stage doubles for discovery, analysis, generation and rendering
//! - Builders for entities and requests

pub mod builders;
pub mod harness;
pub mod stages;

pub use builders::*;
pub use harness::*;
pub use stages::*;
