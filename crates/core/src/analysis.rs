//! Analysis results: one engine's partial contribution and the merged,
//! unified result returned to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Well-known metric names engines may emit.
pub mod metric {
    /// Semantic similarity-derived coherence, in [0, 1].
    pub const SEMANTIC_COHERENCE: &str = "semantic_coherence";
    /// Predicted overall quality, in [0, 100].
    pub const OVERALL_QUALITY: &str = "overall_quality";
    /// Weighted completion against per-section minimums, in [0, 1].
    pub const COMPLETION_SCORE: &str = "completion_score";
    /// Structural risk estimate, in [0, 1].
    pub const RISK_SCORE: &str = "risk_score";
    /// Best retrieval confidence of the knowledge engine, in [0, 1].
    pub const KNOWLEDGE_CONFIDENCE: &str = "knowledge_confidence";
    /// Number of thematic clusters found among the items.
    pub const SEMANTIC_CLUSTERS: &str = "semantic_clusters";
    /// Edge density of the item similarity graph, in [0, 1].
    pub const GRAPH_DENSITY: &str = "graph_density";
    /// Connected components of the item similarity graph.
    pub const GRAPH_COMPONENTS: &str = "graph_components";
}

// ── Suggestions ─────────────────────────────────────────────────────────

/// How urgently a suggestion should be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// A single actionable suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Stable id; suggestions with the same id are merged across engines
    pub id: String,
    pub text: String,
    /// In [0, 1]
    pub confidence: f64,
    pub priority: SuggestionPriority,
    pub category: String,
    /// Engine that produced the retained metadata
    #[serde(default)]
    pub source: String,
}

impl Suggestion {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        confidence: f64,
        priority: SuggestionPriority,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            confidence,
            priority,
            category: category.into(),
            source: String::new(),
        }
    }
}

// ── Partial results ─────────────────────────────────────────────────────

/// How an engine's call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineOutcome {
    Completed,
    Failed,
    TimedOut,
    Panicked,
    Unavailable,
}

impl From<&EngineError> for EngineOutcome {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Timeout(_) => Self::TimedOut,
            EngineError::Panicked(_) => Self::Panicked,
            EngineError::Unavailable(_) => Self::Unavailable,
            EngineError::Failed(_) | EngineError::Malformed(_) => Self::Failed,
        }
    }
}

/// One engine's contribution to an analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialAnalysisResult {
    pub engine: String,
    /// In [0, 1]; 0 for a failed engine
    pub confidence: f64,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub outcome: EngineOutcome,
    /// Set when the engine did not complete normally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl PartialAnalysisResult {
    /// A completed result with no suggestions yet.
    pub fn new(engine: impl Into<String>, confidence: f64) -> Self {
        Self {
            engine: engine.into(),
            confidence,
            suggestions: Vec::new(),
            metrics: BTreeMap::new(),
            outcome: EngineOutcome::Completed,
            diagnostic: None,
        }
    }

    /// The empty, zero-confidence stand-in for an engine that failed.
    pub fn failed(engine: impl Into<String>, err: &EngineError) -> Self {
        Self {
            engine: engine.into(),
            confidence: 0.0,
            suggestions: Vec::new(),
            metrics: BTreeMap::new(),
            outcome: EngineOutcome::from(err),
            diagnostic: Some(format!("{}: {err}", err.tag())),
        }
    }

    /// Attach a suggestion, stamping this engine as its source.
    pub fn with_suggestion(mut self, mut suggestion: Suggestion) -> Self {
        suggestion.source = self.engine.clone();
        self.suggestions.push(suggestion);
        self
    }

    pub fn push_suggestion(&mut self, mut suggestion: Suggestion) {
        suggestion.source = self.engine.clone();
        self.suggestions.push(suggestion);
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == EngineOutcome::Completed
    }

    /// Check the result is well formed: finite confidences in [0, 1],
    /// non-empty suggestion ids, finite metrics.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !unit_interval(self.confidence) {
            return Err(EngineError::Malformed(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        for s in &self.suggestions {
            if s.id.trim().is_empty() {
                return Err(EngineError::Malformed("suggestion with empty id".into()));
            }
            if !unit_interval(s.confidence) {
                return Err(EngineError::Malformed(format!(
                    "suggestion '{}' confidence {} outside [0, 1]",
                    s.id, s.confidence
                )));
            }
        }
        if let Some((name, _)) = self.metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(EngineError::Malformed(format!("metric '{name}' is not finite")));
        }
        Ok(())
    }
}

fn unit_interval(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

// ── Unified result ──────────────────────────────────────────────────────

/// Where the coherence score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceSource {
    Semantic,
    Structural,
}

/// Per-engine summary included in the unified result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    pub name: String,
    pub outcome: EngineOutcome,
    pub confidence: f64,
    pub suggestion_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl From<&PartialAnalysisResult> for EngineReport {
    fn from(p: &PartialAnalysisResult) -> Self {
        Self {
            name: p.engine.clone(),
            outcome: p.outcome,
            confidence: p.confidence,
            suggestion_count: p.suggestions.len(),
            diagnostic: p.diagnostic.clone(),
        }
    }
}

/// The merged result of one orchestration call. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAnalysisResult {
    pub mission_id: String,

    /// All scores are in [0, 100]
    pub completion: f64,
    pub quality: f64,
    pub coherence: f64,
    pub compliance: f64,
    pub detail_level: f64,
    pub coherence_source: CoherenceSource,

    /// Deduplicated by id; priority desc, confidence desc, id asc
    pub suggestions: Vec<Suggestion>,

    pub next_steps: Vec<String>,

    pub engines: Vec<EngineReport>,

    pub analyzed_at: DateTime<Utc>,
}
