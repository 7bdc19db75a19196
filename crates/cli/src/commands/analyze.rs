//! `atelier analyze`: Run one analysis over a workshop file.

use std::path::Path;

use atelier_core::workshop::WorkshopData;
use atelier_orchestrator::{AnalysisOrchestrator, AnalysisRequest};

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    mission: String,
    agent: String,
    session: String,
    user: Option<String>,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| format!("{} is not valid JSON: {e}", file.display()))?;
    let workshop = WorkshopData::from_json(payload)?;
    tracing::debug!(items = workshop.total_items(), file = %file.display(), "Loaded workshop");

    let orchestrator = AnalysisOrchestrator::from_config(&config).await;
    let mut request = AnalysisRequest::new(mission, agent, session, workshop);
    if let Some(user) = user {
        request = request.with_user(user);
    }

    let result = orchestrator.analyze(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
