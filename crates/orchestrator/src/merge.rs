//! Deterministic merge of partial results.
//!
//! Partials are processed in engine-name order whatever order they
//! arrived in. Suggestions sharing an id collapse into one: the last
//! writer in that order supplies the text and metadata, and the
//! confidence is the maximum seen for the id. The final list is sorted by
//! priority desc, confidence desc, id asc.

use std::collections::BTreeMap;

use atelier_core::analysis::{metric, EngineReport, PartialAnalysisResult, Suggestion};

use crate::scoring::EngineSignals;

/// Everything the orchestrator derives from the engines' partials.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedAnalysis {
    pub suggestions: Vec<Suggestion>,
    pub signals: EngineSignals,
    /// One per partial, sorted by engine name
    pub reports: Vec<EngineReport>,
}

pub fn merge(partials: &[PartialAnalysisResult]) -> MergedAnalysis {
    let mut ordered: Vec<&PartialAnalysisResult> = partials.iter().collect();
    ordered.sort_by(|a, b| a.engine.cmp(&b.engine));

    MergedAnalysis {
        suggestions: merge_suggestions(&ordered),
        signals: signals(&ordered),
        reports: ordered.iter().map(|p| EngineReport::from(*p)).collect(),
    }
}

fn merge_suggestions(ordered: &[&PartialAnalysisResult]) -> Vec<Suggestion> {
    let mut by_id: BTreeMap<&str, Suggestion> = BTreeMap::new();
    for suggestion in ordered.iter().flat_map(|p| p.suggestions.iter()) {
        match by_id.get_mut(suggestion.id.as_str()) {
            Some(existing) => {
                let confidence = existing.confidence.max(suggestion.confidence);
                *existing = Suggestion {
                    confidence,
                    ..suggestion.clone()
                };
            }
            None => {
                by_id.insert(suggestion.id.as_str(), suggestion.clone());
            }
        }
    }

    let mut merged: Vec<Suggestion> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

/// Mean of a metric across completed partials that emitted it.
fn mean_metric(ordered: &[&PartialAnalysisResult], name: &str) -> Option<f64> {
    let values: Vec<f64> = ordered
        .iter()
        .filter(|p| p.is_completed())
        .filter_map(|p| p.metric(name))
        .filter(|v| v.is_finite())
        .collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn signals(ordered: &[&PartialAnalysisResult]) -> EngineSignals {
    EngineSignals {
        semantic_coherence: mean_metric(ordered, metric::SEMANTIC_COHERENCE),
        predicted_quality: mean_metric(ordered, metric::OVERALL_QUALITY),
    }
}
