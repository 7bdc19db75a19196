//! Analysis engine trait — one independent analyzer of a workshop.
//!
//! Engines share no mutable state and must be callable concurrently from
//! many orchestration calls. An engine reports failure through
//! [`EngineError`]; [`AnalysisEngine::run`] turns any error or malformed
//! output into an empty zero-confidence result, so one broken engine never
//! aborts a batch.
//!
//! The orchestrator bounds each call with a timeout, which can only fire
//! at an await point. CPU-heavy work belongs on the blocking pool
//! (`tokio::task::spawn_blocking`) and should stop once the call is dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::PartialAnalysisResult;
use crate::context::UserContext;
use crate::error::EngineError;
use crate::workshop::WorkshopData;

/// Static descriptor of one engine, fixed after registry probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapability {
    pub name: String,
    pub available: bool,
    #[serde(default)]
    pub features: Vec<String>,
    /// Why the engine is unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation_reason: Option<String>,
}

impl EngineCapability {
    pub fn available(name: impl Into<String>, features: Vec<String>) -> Self {
        Self {
            name: name.into(),
            available: true,
            features,
            degradation_reason: None,
        }
    }

    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: false,
            features: Vec::new(),
            degradation_reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Stable engine name (e.g. "semantic").
    fn name(&self) -> &str;

    /// Feature flags advertised when the engine is available.
    fn features(&self) -> Vec<String> {
        Vec::new()
    }

    /// Cheap initialization check (load a resource, build a client).
    /// Called once per process by the capability registry.
    async fn probe(&self) -> Result<(), EngineError>;

    async fn analyze(
        &self,
        workshop: &WorkshopData,
        context: &UserContext,
    ) -> Result<PartialAnalysisResult, EngineError>;

    /// Analyze, converting errors and malformed output into an empty
    /// zero-confidence result tagged with the cause.
    async fn run(&self, workshop: &WorkshopData, context: &UserContext) -> PartialAnalysisResult {
        let outcome = match self.analyze(workshop, context).await {
            Ok(partial) => partial.validate().map(|()| partial),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(mut partial) => {
                partial.engine = self.name().to_string();
                for s in &mut partial.suggestions {
                    s.source = self.name().to_string();
                }
                partial
            }
            Err(e) => {
                warn!(engine = %self.name(), error = %e, "Engine failed, contributing empty result");
                PartialAnalysisResult::failed(self.name(), &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{EngineOutcome, Suggestion, SuggestionPriority};
    use chrono::Utc;

    struct Fixed(Result<PartialAnalysisResult, EngineError>);

    #[async_trait]
    impl AnalysisEngine for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn probe(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn analyze(
            &self,
            _: &WorkshopData,
            _: &UserContext,
        ) -> Result<PartialAnalysisResult, EngineError> {
            self.0.clone()
        }
    }

    fn ctx() -> UserContext {
        UserContext::new("u", "m", Utc::now())
    }

    #[tokio::test]
    async fn run_passes_through_valid_results() {
        let engine = Fixed(Ok(PartialAnalysisResult::new("other", 0.8).with_suggestion(
            Suggestion::new("s1", "t", 0.7, SuggestionPriority::High, "c"),
        )));
        let p = engine.run(&WorkshopData::default(), &ctx()).await;
        assert_eq!(p.engine, "fixed");
        assert_eq!(p.suggestions[0].source, "fixed");
        assert_eq!(p.confidence, 0.8);
    }

    #[tokio::test]
    async fn run_converts_errors() {
        let engine = Fixed(Err(EngineError::Failed("model missing".into())));
        let p = engine.run(&WorkshopData::default(), &ctx()).await;
        assert_eq!(p.outcome, EngineOutcome::Failed);
        assert_eq!(p.confidence, 0.0);
        assert!(p.diagnostic.unwrap().contains("model missing"));
    }

    #[tokio::test]
    async fn run_converts_malformed_output() {
        let engine = Fixed(Ok(PartialAnalysisResult::new("fixed", 3.0)));
        let p = engine.run(&WorkshopData::default(), &ctx()).await;
        assert_eq!(p.outcome, EngineOutcome::Failed);
        assert!(p.diagnostic.unwrap().starts_with("malformed"));
    }

    #[test]
    fn capability_constructors() {
        let up = EngineCapability::available("semantic", vec!["similarity".into()]);
        assert!(up.available);
        let down = EngineCapability::unavailable("knowledge", "knowledge base missing");
        assert!(!down.available);
        assert_eq!(down.degradation_reason.as_deref(), Some("knowledge base missing"));
    }
}
