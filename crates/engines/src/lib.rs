//! Analysis engines for Atelier.
//!
//! Four independent analyzers of a workshop, each implementing
//! [`AnalysisEngine`](atelier_core::AnalysisEngine):
//!
//! - [`RuleBasedEngine`]: deterministic completeness and link rules
//! - [`SemanticEngine`]: text-similarity coherence
//! - [`StatisticalEngine`]: completion, quality and risk scoring
//! - [`KnowledgeEngine`]: methodology guidance by keyword retrieval
//!
//! [`CapabilityRegistry`] probes them once at startup and records which
//! are usable in this process.

pub mod knowledge;
pub mod registry;
pub mod rule_based;
pub mod semantic;
pub mod statistical;
pub mod unavailable;

pub use knowledge::{KnowledgeBase, KnowledgeDocument, KnowledgeEngine};
pub use registry::{CapabilityRegistry, DEFAULT_PROBE_TIMEOUT, default_engines};
pub use rule_based::RuleBasedEngine;
pub use semantic::SemanticEngine;
pub use statistical::StatisticalEngine;
pub use unavailable::UnavailableEngine;
