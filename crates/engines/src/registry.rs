//! Capability registry: probes every engine once and freezes the result.
//!
//! Probing never fails: an engine whose probe errors, panics or times out
//! is recorded as unavailable with the reason. After construction the
//! registry is read-only and lookups are O(1).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tracing::{info, warn};

use atelier_config::{EnginesConfig, ScoringConfig};
use atelier_core::engine::{AnalysisEngine, EngineCapability};
use atelier_core::error::EngineError;

use crate::knowledge::KnowledgeEngine;
use crate::rule_based::RuleBasedEngine;
use crate::semantic::SemanticEngine;
use crate::statistical::StatisticalEngine;
use crate::unavailable::UnavailableEngine;

/// Budget for a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

struct Registered {
    engine: Arc<dyn AnalysisEngine>,
    capability: EngineCapability,
}

/// Frozen set of engines and their capabilities.
pub struct CapabilityRegistry {
    engines: Vec<Registered>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

async fn probe_one(engine: &dyn AnalysisEngine, timeout: Duration) -> Result<(), EngineError> {
    let guarded = AssertUnwindSafe(engine.probe()).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(EngineError::Panicked("probe panicked".into())),
        Err(_) => Err(EngineError::Timeout(timeout.as_millis() as u64)),
    }
}

impl CapabilityRegistry {
    /// Probe every engine concurrently with [`DEFAULT_PROBE_TIMEOUT`].
    pub async fn probe(engines: Vec<Arc<dyn AnalysisEngine>>) -> Self {
        Self::probe_with_timeout(engines, DEFAULT_PROBE_TIMEOUT).await
    }

    /// Probe every engine concurrently. Engines sharing a name with an
    /// earlier one are ignored.
    pub async fn probe_with_timeout(engines: Vec<Arc<dyn AnalysisEngine>>, timeout: Duration) -> Self {
        let mut unique: Vec<Arc<dyn AnalysisEngine>> = Vec::with_capacity(engines.len());
        for engine in engines {
            if unique.iter().any(|e| e.name() == engine.name()) {
                warn!(engine = %engine.name(), "Duplicate engine name, ignoring");
                continue;
            }
            unique.push(engine);
        }

        let results = join_all(unique.iter().map(|e| probe_one(e.as_ref(), timeout))).await;

        let mut registry = Self {
            engines: Vec::with_capacity(unique.len()),
            index: HashMap::new(),
        };
        for (engine, result) in unique.into_iter().zip(results) {
            let name = engine.name().to_string();
            let capability = match result {
                Ok(()) => {
                    info!(engine = %name, "Engine available");
                    EngineCapability::available(&name, engine.features())
                }
                Err(e) => {
                    warn!(engine = %name, error = %e, "Engine unavailable, degrading");
                    let reason = match e {
                        EngineError::Unavailable(reason) => reason,
                        other => other.to_string(),
                    };
                    EngineCapability::unavailable(&name, reason)
                }
            };
            registry.index.insert(name, registry.engines.len());
            registry.engines.push(Registered { engine, capability });
        }
        registry
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.capability(name).is_some_and(|c| c.available)
    }

    pub fn capability(&self, name: &str) -> Option<&EngineCapability> {
        self.index.get(name).map(|&i| &self.engines[i].capability)
    }

    /// Capabilities of every registered engine, in registration order.
    pub fn capabilities(&self) -> Vec<EngineCapability> {
        self.engines.iter().map(|r| r.capability.clone()).collect()
    }

    /// Engines whose probe succeeded.
    pub fn available_engines(&self) -> Vec<Arc<dyn AnalysisEngine>> {
        self.engines
            .iter()
            .filter(|r| r.capability.available)
            .map(|r| Arc::clone(&r.engine))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Build the four built-in engines from configuration. A disabled engine
/// is replaced by an [`UnavailableEngine`] so it still shows up in
/// capability listings.
pub fn default_engines(engines: &EnginesConfig, scoring: &ScoringConfig) -> Vec<Arc<dyn AnalysisEngine>> {
    let disabled = |name: &str| -> Arc<dyn AnalysisEngine> {
        Arc::new(UnavailableEngine::new(name, "disabled in configuration"))
    };

    vec![
        if engines.rule_based.enabled {
            Arc::new(RuleBasedEngine::new(scoring.min_description_length))
        } else {
            disabled("rule_based")
        },
        if engines.semantic.enabled {
            Arc::new(SemanticEngine::new(engines.semantic.dimensions))
        } else {
            disabled("semantic")
        },
        if engines.statistical.enabled {
            Arc::new(StatisticalEngine::new(
                scoring.target_description_length,
                scoring.min_description_length,
            ))
        } else {
            disabled("statistical")
        },
        if engines.knowledge.enabled {
            Arc::new(KnowledgeEngine::new(engines.knowledge.knowledge_base_path.clone()))
        } else {
            disabled("knowledge")
        },
    ]
}
