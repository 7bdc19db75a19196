//! # Atelier Core
//!
//! Domain types, traits, and error definitions for the Atelier agent memory
//! and analysis subsystem. This crate has **no storage or runtime
//! dependencies**: it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! The two seams of the system are traits defined here:
//! - [`MemoryTier`]: one storage backend (hot, warm or cold)
//! - [`AnalysisEngine`]: one independent analyzer of a workshop payload
//!
//! Implementations live in `atelier-memory` and `atelier-engines`, and are
//! wired together explicitly by the orchestrator at process start.

pub mod analysis;
pub mod clock;
pub mod context;
pub mod engine;
pub mod error;
pub mod memory;
pub mod workshop;

// Re-export key types at crate root for ergonomics
pub use analysis::{
    CoherenceSource, EngineOutcome, EngineReport, PartialAnalysisResult, Suggestion,
    SuggestionPriority, UnifiedAnalysisResult, metric,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{Interaction, UserContext};
pub use engine::{AnalysisEngine, EngineCapability};
pub use error::{EngineError, Error, InvalidInput, MemoryError, Result};
pub use memory::{
    AnalysisSnapshot, MemoryContent, MemoryEntry, MemoryFilter, MemoryKind, MemoryTier, Priority,
    TierLevel, sort_for_retrieval,
};
pub use workshop::{Section, WorkshopData, WorkshopItem};
