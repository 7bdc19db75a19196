//! Error types for the Atelier domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum. Only [`InvalidInput`] is
//! ever surfaced to a caller of the orchestrator; the others are absorbed
//! and logged where they occur.

use thiserror::Error;

/// The top-level error type for all Atelier operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Caller errors ---
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Tier unavailable: {0}")]
    TierUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Tier {tier} timed out after {millis}ms")]
    Timeout { tier: String, millis: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Engine failed: {0}")]
    Failed(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine timed out after {0}ms")]
    Timeout(u64),

    #[error("Engine panicked: {0}")]
    Panicked(String),

    #[error("Engine returned malformed data: {0}")]
    Malformed(String),
}

impl EngineError {
    /// Short machine-readable tag attached to the empty result that
    /// replaces a failed engine's contribution.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Panicked(_) => "panicked",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Structurally invalid caller input. Rejected before any engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInput {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("item in {0} has an empty id")]
    EmptyId(&'static str),

    #[error("duplicate id '{id}' in {section}")]
    DuplicateId { section: &'static str, id: String },

    #[error("expiry must be later than creation for entry '{0}'")]
    ExpiryBeforeCreation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_error_displays_correctly() {
        let err = Error::Memory(MemoryError::Timeout {
            tier: "hot".into(),
            millis: 500,
        });
        assert!(err.to_string().contains("hot"));
        assert!(err.to_string().contains("500ms"));
    }

    #[test]
    fn invalid_input_displays_correctly() {
        let err = Error::from(InvalidInput::DuplicateId {
            section: "business_values",
            id: "bv1".into(),
        });
        assert!(err.to_string().contains("business_values"));
        assert!(err.to_string().contains("bv1"));
    }

    #[test]
    fn engine_error_tags_are_stable() {
        assert_eq!(EngineError::Timeout(2000).tag(), "timeout");
        assert_eq!(EngineError::Panicked("boom".into()).tag(), "panicked");
        assert_eq!(EngineError::Unavailable("no kb".into()).tag(), "unavailable");
    }
}
