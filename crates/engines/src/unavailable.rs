//! Stand-in for an engine that cannot run in this process.

use async_trait::async_trait;

use atelier_core::analysis::PartialAnalysisResult;
use atelier_core::context::UserContext;
use atelier_core::engine::AnalysisEngine;
use atelier_core::error::EngineError;
use atelier_core::workshop::WorkshopData;

/// An engine that is disabled or missing. Its probe fails with the
/// recorded reason, so the registry marks it unavailable and the
/// orchestrator never calls it.
pub struct UnavailableEngine {
    name: String,
    reason: String,
}

impl UnavailableEngine {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl AnalysisEngine for UnavailableEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable(self.reason.clone()))
    }

    async fn analyze(
        &self,
        _workshop: &WorkshopData,
        _context: &UserContext,
    ) -> Result<PartialAnalysisResult, EngineError> {
        Err(EngineError::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn probe_and_analyze_report_reason() {
        let engine = UnavailableEngine::new("semantic", "disabled in configuration");
        assert_eq!(engine.name(), "semantic");
        match engine.probe().await {
            Err(EngineError::Unavailable(reason)) => assert_eq!(reason, "disabled in configuration"),
            other => panic!("unexpected probe result: {other:?}"),
        }
        let ctx = UserContext::new("u", "m", Utc::now());
        let p = engine.run(&WorkshopData::default(), &ctx).await;
        assert_eq!(p.confidence, 0.0);
        assert!(p.diagnostic.unwrap().contains("disabled"));
    }
}
