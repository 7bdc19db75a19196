//! End-to-end tests for the Atelier analysis pipeline.
//!
//! These exercise the real engines, the capability registry, the tiered
//! store and the orchestrator together, starting from workshop JSON.

use std::sync::Arc;

use atelier_config::{AppConfig, EnginesConfig, ScoringConfig};
use atelier_core::analysis::{CoherenceSource, EngineOutcome};
use atelier_core::error::InvalidInput;
use atelier_core::memory::{MemoryContent, MemoryFilter, MemoryKind};
use atelier_core::workshop::WorkshopData;
use atelier_engines::{CapabilityRegistry, default_engines};
use atelier_memory::{InProcessTier, TieredMemoryStore};
use atelier_orchestrator::{AnalysisOrchestrator, AnalysisRequest, OrchestratorError};
use serde_json::json;

// ── Helpers ──────────────────────────────────────────────────────────────

async fn pipeline(engines: &EnginesConfig) -> AnalysisOrchestrator {
    let scoring = ScoringConfig::default();
    let registry = Arc::new(CapabilityRegistry::probe(default_engines(engines, &scoring)).await);
    let store = Arc::new(TieredMemoryStore::new(InProcessTier::new(100)));
    AnalysisOrchestrator::new(registry, store)
        .with_engines_config(engines.clone())
        .with_scoring(scoring)
}

fn described(topic: &str) -> String {
    format!(
        "The {topic} supports daily operations of the organisation and is reviewed \
         by the security team every quarter."
    )
}

fn complete_workshop() -> WorkshopData {
    let payload = json!({
        "businessValues": [
            { "id": "bv1", "name": "Online sales", "description": described("online shop") },
            { "id": "bv2", "name": "Customer trust", "description": described("brand reputation") }
        ],
        "essentialAssets": [
            { "id": "ea1", "name": "Order data", "description": described("order database"), "businessValueId": "bv1" },
            { "id": "ea2", "name": "Payment flow", "description": described("payment process"), "businessValueId": "bv1" },
            { "id": "ea3", "name": "Customer records", "description": described("customer registry"), "businessValueId": "bv2" }
        ],
        "supportingAssets": [
            { "id": "sa1", "name": "Web servers", "description": described("web cluster"), "essentialAssetId": "ea1" },
            { "id": "sa2", "name": "Database cluster", "description": described("database cluster"), "essentialAssetId": "ea1" },
            { "id": "sa3", "name": "Payment gateway", "description": described("payment gateway"), "essentialAssetId": "ea2" },
            { "id": "sa4", "name": "CRM", "description": described("CRM platform"), "essentialAssetId": "ea3" },
            { "id": "sa5", "name": "Backups", "description": described("backup storage"), "essentialAssetId": "ea1" }
        ],
        "dreadedEvents": [
            { "id": "de1", "name": "Data leak", "description": described("customer data"), "businessValueId": "bv2" }
        ]
    });
    WorkshopData::from_json(payload).unwrap()
}

// ── Full pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn complete_workshop_runs_every_engine() {
    let orch = pipeline(&EnginesConfig::default()).await;
    assert!(orch.capabilities().iter().all(|c| c.available));

    let result = orch
        .analyze(AnalysisRequest::new("M-100", "agent-1", "session-1", complete_workshop()).with_user("alice"))
        .await
        .unwrap();

    assert_eq!(result.mission_id, "M-100");
    assert_eq!(result.completion, 100.0);
    assert_eq!(result.compliance, 100.0);
    assert_eq!(result.engines.len(), 4);
    assert!(result.engines.iter().all(|e| e.outcome == EngineOutcome::Completed));
    assert_eq!(result.coherence_source, CoherenceSource::Semantic);
    assert!((0.0..=100.0).contains(&result.quality));
    assert!((0.0..=100.0).contains(&result.coherence));
    assert!((0.0..=100.0).contains(&result.detail_level));
    assert_eq!(result.next_steps.len(), 3);

    for pair in result.suggestions.windows(2) {
        assert!(pair[0].priority >= pair[1].priority);
    }
}

#[tokio::test]
async fn empty_workshop_asks_for_business_values() {
    let orch = pipeline(&EnginesConfig::default()).await;
    let result = orch
        .analyze(AnalysisRequest::new("M-1", "agent-1", "session-1", WorkshopData::default()))
        .await
        .unwrap();

    assert_eq!(result.completion, 0.0);
    assert_eq!(result.detail_level, 0.0);
    assert_eq!(result.suggestions[0].id, "bv_missing");
    assert!(result.next_steps[0].starts_with("Define at least one business value"));
}

#[tokio::test]
async fn disabled_engines_are_reported_unavailable() {
    let mut engines = EnginesConfig::default();
    engines.semantic.enabled = false;
    engines.knowledge.enabled = false;

    let orch = pipeline(&engines).await;
    let result = orch
        .analyze(AnalysisRequest::new("M-2", "agent-1", "session-1", complete_workshop()))
        .await
        .unwrap();

    assert_eq!(result.coherence_source, CoherenceSource::Structural);
    assert_eq!(result.coherence, 100.0);
    let unavailable: Vec<_> = result
        .engines
        .iter()
        .filter(|e| e.outcome == EngineOutcome::Unavailable)
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(unavailable.len(), 2);
    assert!(unavailable.contains(&"semantic"));
    assert!(unavailable.contains(&"knowledge"));
}

#[tokio::test]
async fn analysis_is_remembered_for_the_mission() {
    let orch = pipeline(&EnginesConfig::default()).await;
    orch.analyze(AnalysisRequest::new("M-3", "agent-1", "session-1", complete_workshop()).with_user("alice"))
        .await
        .unwrap();

    let filter = MemoryFilter::agent("agent-1").with_kind(MemoryKind::Analysis);
    let entries = orch.store().retrieve("M-3", &filter, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(matches!(entries[0].content, MemoryContent::Analysis(_)));

    // Other missions stay isolated
    assert!(orch.store().retrieve("M-4", &filter, 10).await.unwrap().is_empty());

    let context = orch.store().retrieve_user_context("alice", "M-3").await.unwrap();
    assert_eq!(context.progress("completion"), Some(1.0));
}

// ── Input validation ─────────────────────────────────────────────────────

#[test]
fn malformed_workshop_json_is_rejected() {
    let err = WorkshopData::from_json(json!({ "businessValues": "not a list" })).unwrap_err();
    assert!(matches!(err, InvalidInput::Malformed(_)));
}

#[tokio::test]
async fn duplicate_ids_fail_before_analysis() {
    let workshop = WorkshopData::from_json(json!({
        "businessValues": [
            { "id": "bv1", "name": "A" },
            { "id": "bv1", "name": "B" }
        ]
    }))
    .unwrap();

    let orch = pipeline(&EnginesConfig::default()).await;
    let err = orch
        .analyze(AnalysisRequest::new("M-5", "agent-1", "session-1", workshop))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidInput(InvalidInput::DuplicateId { .. })
    ));
}

#[tokio::test]
async fn default_config_builds_a_working_pipeline() {
    let mut config = AppConfig::default();
    config.memory.redis_url = None;
    config.memory.database_url = None;

    let orch = AnalysisOrchestrator::from_config(&config).await;
    assert_eq!(orch.capabilities().len(), 4);

    let result = orch
        .analyze(AnalysisRequest::new("M-6", "agent-1", "session-1", complete_workshop()))
        .await
        .unwrap();
    assert_eq!(result.completion, 100.0);
}
