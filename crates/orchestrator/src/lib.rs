//! Analysis orchestration for Atelier.
//!
//! [`AnalysisOrchestrator`] loads the caller's context from the tiered
//! memory store, fans a workshop out to every available engine, merges
//! their partial results deterministically, aggregates scores and
//! persists the outcome.

pub mod merge;
pub mod orchestrator;
pub mod scoring;

pub use merge::{MergedAnalysis, merge};
pub use orchestrator::{AnalysisOrchestrator, AnalysisRequest, OrchestratorError};
pub use scoring::{EngineSignals, LinkStats, Scores};
