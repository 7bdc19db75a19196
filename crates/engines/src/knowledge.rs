//! Knowledge engine: keyword retrieval over a methodology knowledge base.
//!
//! Queries are derived from the gaps in the workshop. Each query scores
//! every document (+3 per query word found in the title, +1 per word found
//! in the content, words longer than three characters only) and keeps the
//! two best. Answers above [`SUGGESTION_THRESHOLD`] become suggestions.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use atelier_core::analysis::{metric, PartialAnalysisResult, Suggestion, SuggestionPriority};
use atelier_core::context::UserContext;
use atelier_core::engine::AnalysisEngine;
use atelier_core::error::EngineError;
use atelier_core::workshop::{Section, WorkshopData};

/// Answers at or below this confidence are not turned into suggestions.
pub const SUGGESTION_THRESHOLD: f64 = 0.3;
const TOP_DOCUMENTS: usize = 2;
const NO_MATCH_CONFIDENCE: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub source: String,
}

impl KnowledgeDocument {
    fn new(id: &str, title: &str, content: &str, category: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            category: category.into(),
            source: "built-in".into(),
        }
    }
}

/// One scored document in an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub id: String,
    pub title: String,
    pub score: u32,
}

/// The result of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub query: String,
    pub documents: Vec<ScoredDocument>,
    pub confidence: f64,
}

fn score_confidence(score: u32) -> f64 {
    (score as f64 / 10.0).min(MAX_CONFIDENCE)
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    documents: Vec<KnowledgeDocument>,
}

impl KnowledgeBase {
    pub fn new(documents: Vec<KnowledgeDocument>) -> Self {
        Self { documents }
    }

    /// The built-in risk-management methodology notes.
    pub fn builtin() -> Self {
        Self::new(vec![
            KnowledgeDocument::new(
                "methodology_overview",
                "Risk Management Methodology",
                "A risk assessment runs through five workshops: scoping and security baseline, \
                 risk sources, strategic scenarios, operational scenarios and risk treatment. \
                 The scoping workshop defines business values, essential assets, supporting \
                 assets and dreaded events.",
                "methodology",
            ),
            KnowledgeDocument::new(
                "business_values_definition",
                "Defining Business Values",
                "Business values are what has value for the organisation and its stakeholders: \
                 critical business processes, public service missions, reputation, regulatory \
                 compliance, competitive advantage. Describe each business value precisely with \
                 its security needs.",
                "guide",
            ),
            KnowledgeDocument::new(
                "essential_assets_definition",
                "Identifying Essential Assets",
                "Essential assets are the information, processes and know-how that are crucial \
                 to the organisation. They directly support business values. Link every \
                 essential asset to at least one business value.",
                "guide",
            ),
            KnowledgeDocument::new(
                "supporting_assets_definition",
                "Identifying Supporting Assets",
                "Supporting assets are the parts of the information system that carry essential \
                 assets: hardware, software, networks, people and sites. Link every supporting \
                 asset to at least one essential asset.",
                "guide",
            ),
            KnowledgeDocument::new(
                "dreaded_events_definition",
                "Defining Dreaded Events",
                "Dreaded events are harms to business values the organisation wants to avoid. \
                 Each names the impacted value, the security criterion affected (availability, \
                 integrity, confidentiality) and the severity of the impact.",
                "guide",
            ),
            KnowledgeDocument::new(
                "workshop_best_practices",
                "Scoping Workshop Best Practices",
                "Involve business, technical and legal stakeholders. Start from business \
                 processes. Be exhaustive when identifying essential assets. Document every \
                 element precisely and validate with process owners.",
                "practice",
            ),
            KnowledgeDocument::new(
                "coherence_guide",
                "Keeping the Analysis Coherent",
                "Coherence means every child element references an existing parent and uses \
                 consistent vocabulary. Review links between values and assets whenever the \
                 analysis grows.",
                "practice",
            ),
            KnowledgeDocument::new(
                "security_criteria",
                "Security Criteria",
                "Availability, integrity and confidentiality are the baseline security criteria. \
                 Traceability and proof may be added where regulation requires them.",
                "reference",
            ),
        ])
    }

    /// Load documents from a JSON array file.
    pub async fn from_path(path: &std::path::Path) -> Result<Self, EngineError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            EngineError::Unavailable(format!("cannot read knowledge base {}: {e}", path.display()))
        })?;
        let documents: Vec<KnowledgeDocument> = serde_json::from_str(&raw).map_err(|e| {
            EngineError::Unavailable(format!("invalid knowledge base {}: {e}", path.display()))
        })?;
        if documents.is_empty() {
            return Err(EngineError::Unavailable(format!(
                "knowledge base {} is empty",
                path.display()
            )));
        }
        Ok(Self::new(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn search(&self, query: &str) -> Answer {
        let words: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 3)
            .map(str::to_lowercase)
            .collect();

        let mut scored: Vec<ScoredDocument> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let title = doc.title.to_lowercase();
                let content = doc.content.to_lowercase();
                let score = words
                    .iter()
                    .map(|w| {
                        let mut s = 0;
                        if title.contains(w.as_str()) {
                            s += 3;
                        }
                        if content.contains(w.as_str()) {
                            s += 1;
                        }
                        s
                    })
                    .sum::<u32>();
                (score > 0).then(|| ScoredDocument {
                    id: doc.id.clone(),
                    title: doc.title.clone(),
                    score,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(TOP_DOCUMENTS);

        let confidence = scored
            .first()
            .map(|d| score_confidence(d.score))
            .unwrap_or(NO_MATCH_CONFIDENCE);
        Answer {
            query: query.to_string(),
            documents: scored,
            confidence,
        }
    }
}

/// Queries for the gaps in a workshop.
pub fn build_queries(workshop: &WorkshopData) -> Vec<&'static str> {
    let current = workshop
        .current_step
        .as_deref()
        .map(|s| s.replace('-', "_"))
        .unwrap_or_default();
    let mut queries = Vec::new();
    for section in Section::ALL {
        if workshop.section(section).is_empty() || current == section.as_str() {
            queries.push(match section {
                Section::BusinessValues => "how to identify and define business values",
                Section::EssentialAssets => "which essential assets support business values",
                Section::SupportingAssets => "identifying supporting assets of the information system",
                Section::DreadedEvents => "defining dreaded events and their security criteria",
            });
        }
    }
    if workshop.total_items() > 5 {
        queries.push("keeping the analysis coherent between values and assets");
    }
    if queries.is_empty() {
        queries.push("scoping workshop best practices");
    }
    queries
}

pub struct KnowledgeEngine {
    path: Option<PathBuf>,
    base: OnceCell<KnowledgeBase>,
}

impl KnowledgeEngine {
    /// Engine over the built-in knowledge base, or over the JSON file at
    /// `path` when given.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            base: OnceCell::new(),
        }
    }

    pub fn with_base(base: KnowledgeBase) -> Self {
        Self {
            path: None,
            base: OnceCell::new_with(Some(base)),
        }
    }

    async fn base(&self) -> Result<&KnowledgeBase, EngineError> {
        self.base
            .get_or_try_init(|| async {
                let base = match &self.path {
                    Some(path) => KnowledgeBase::from_path(path).await?,
                    None => KnowledgeBase::builtin(),
                };
                info!(documents = base.len(), "Knowledge base loaded");
                Ok::<_, EngineError>(base)
            })
            .await
    }
}

impl Default for KnowledgeEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl AnalysisEngine for KnowledgeEngine {
    fn name(&self) -> &str {
        "knowledge"
    }

    fn features(&self) -> Vec<String> {
        vec!["keyword_retrieval".into(), "methodology_guidance".into()]
    }

    async fn probe(&self) -> Result<(), EngineError> {
        self.base().await.map(|_| ())
    }

    async fn analyze(
        &self,
        workshop: &WorkshopData,
        _context: &UserContext,
    ) -> Result<PartialAnalysisResult, EngineError> {
        let base = self.base().await?;
        let answers: Vec<Answer> = build_queries(workshop)
            .into_iter()
            .map(|q| base.search(q))
            .collect();

        let mean = answers.iter().map(|a| a.confidence).sum::<f64>() / answers.len().max(1) as f64;
        let best = answers.iter().map(|a| a.confidence).fold(0.0, f64::max);
        debug!(queries = answers.len(), mean, best, "Knowledge queries answered");

        let mut partial =
            PartialAnalysisResult::new(self.name(), mean).with_metric(metric::KNOWLEDGE_CONFIDENCE, best);
        let mut seen = std::collections::HashSet::new();
        for answer in answers.iter().filter(|a| a.confidence > SUGGESTION_THRESHOLD) {
            for doc in &answer.documents {
                let confidence = score_confidence(doc.score);
                if confidence <= SUGGESTION_THRESHOLD || !seen.insert(doc.id.clone()) {
                    continue;
                }
                partial.push_suggestion(Suggestion::new(
                    format!("knowledge:{}", doc.id),
                    format!("Guidance: see \"{}\" ({}).", doc.title, answer.query),
                    confidence,
                    SuggestionPriority::Low,
                    "guidance",
                ));
            }
        }
        Ok(partial)
    }
}
