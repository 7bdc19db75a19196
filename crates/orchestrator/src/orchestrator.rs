//! Analysis orchestrator.
//!
//! One call runs `load_context -> invoke_engines -> merge -> persist ->
//! return`. Engines run as independent tasks, each bounded by its own
//! timeout and isolated from panics; a failing engine contributes an
//! empty zero-confidence result. Persistence is best effort. The only
//! error a caller sees is [`OrchestratorError::InvalidInput`], or
//! [`OrchestratorError::Cancelled`] from [`AnalysisOrchestrator::analyze_until`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use atelier_config::{AppConfig, EnginesConfig, OrchestratorConfig, ScoringConfig};
use atelier_core::analysis::{EngineOutcome, PartialAnalysisResult, UnifiedAnalysisResult};
use atelier_core::context::UserContext;
use atelier_core::engine::{AnalysisEngine, EngineCapability};
use atelier_core::error::{EngineError, InvalidInput};
use atelier_core::memory::{AnalysisSnapshot, MemoryContent, MemoryEntry, Priority};
use atelier_core::workshop::WorkshopData;
use atelier_engines::{CapabilityRegistry, default_engines};
use atelier_memory::{SweeperHandle, TieredMemoryStore};

use crate::merge::merge;
use crate::scoring::{aggregate, next_steps};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    #[error("Analysis cancelled by caller")]
    Cancelled,
}

/// One analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub mission_id: String,
    pub agent_id: String,
    pub session_id: String,
    /// Owner of the user context; the agent id when absent
    pub user_id: Option<String>,
    pub workshop: WorkshopData,
    /// Overrides the stored context when given
    pub user_context: Option<UserContext>,
}

impl AnalysisRequest {
    pub fn new(
        mission_id: impl Into<String>,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        workshop: WorkshopData,
    ) -> Self {
        Self {
            mission_id: mission_id.into(),
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            user_id: None,
            workshop,
            user_context: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_context(mut self, context: UserContext) -> Self {
        self.user_context = Some(context);
        self
    }

    /// The user context owner.
    pub fn owner(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.agent_id)
    }

    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.mission_id.trim().is_empty() {
            return Err(InvalidInput::MissingField("mission_id"));
        }
        if self.agent_id.trim().is_empty() {
            return Err(InvalidInput::MissingField("agent_id"));
        }
        if self.session_id.trim().is_empty() {
            return Err(InvalidInput::MissingField("session_id"));
        }
        if self.user_id.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(InvalidInput::MissingField("user_id"));
        }
        if let Some(ctx) = &self.user_context {
            if ctx.mission_id != self.mission_id {
                return Err(InvalidInput::Malformed(format!(
                    "user context belongs to mission '{}', not '{}'",
                    ctx.mission_id, self.mission_id
                )));
            }
        }
        self.workshop.validate()
    }
}

/// What the compute phase hands to persistence.
struct Computed {
    result: UnifiedAnalysisResult,
    context: UserContext,
    completed_engines: Vec<String>,
    degraded_engines: Vec<String>,
}

pub struct AnalysisOrchestrator {
    registry: Arc<CapabilityRegistry>,
    store: Arc<TieredMemoryStore>,
    engines: EnginesConfig,
    scoring: ScoringConfig,
    config: OrchestratorConfig,
    sweeper: Option<SweeperHandle>,
}

impl AnalysisOrchestrator {
    pub fn new(registry: Arc<CapabilityRegistry>, store: Arc<TieredMemoryStore>) -> Self {
        Self {
            registry,
            store,
            engines: EnginesConfig::default(),
            scoring: ScoringConfig::default(),
            config: OrchestratorConfig::default(),
            sweeper: None,
        }
    }

    pub fn with_engines_config(mut self, engines: EnginesConfig) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sweep expired entries in the background for as long as the
    /// orchestrator lives.
    pub fn with_sweeper(mut self, interval: Duration) -> Self {
        self.sweeper = Some(self.store.spawn_sweeper(interval));
        self
    }

    /// Build the store, probe the built-in engines, start the sweeper and
    /// wire everything together from one configuration.
    pub async fn from_config(config: &AppConfig) -> Self {
        let store = Arc::new(TieredMemoryStore::from_config(&config.memory).await);
        let registry = Arc::new(
            CapabilityRegistry::probe(default_engines(&config.engines, &config.scoring)).await,
        );
        Self::new(registry, store)
            .with_engines_config(config.engines.clone())
            .with_scoring(config.scoring.clone())
            .with_config(config.orchestrator.clone())
            .with_sweeper(config.memory.sweep_interval())
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn capabilities(&self) -> Vec<EngineCapability> {
        self.registry.capabilities()
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<TieredMemoryStore> {
        &self.store
    }

    /// Run one analysis to completion.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<UnifiedAnalysisResult, OrchestratorError> {
        let computed = self.compute(request.clone()).await?;
        Ok(self.persist(&request, computed).await)
    }

    /// Like [`analyze`](Self::analyze), but abandons the call when `cancel`
    /// resolves first. A cancelled call returns no result, persists
    /// nothing, and aborts the engines still running.
    pub async fn analyze_until<C>(
        &self,
        request: AnalysisRequest,
        cancel: C,
    ) -> Result<UnifiedAnalysisResult, OrchestratorError>
    where
        C: Future<Output = ()> + Send,
    {
        let computed = tokio::select! {
            biased;
            _ = cancel => {
                info!(mission = %request.mission_id, "Analysis cancelled");
                return Err(OrchestratorError::Cancelled);
            }
            computed = self.compute(request.clone()) => computed?,
        };
        Ok(self.persist(&request, computed).await)
    }

    async fn compute(&self, request: AnalysisRequest) -> Result<Computed, OrchestratorError> {
        request.validate()?;
        let mission = request.mission_id.as_str();

        debug!(mission = %mission, phase = "load_context", "Analysis phase");
        let now = self.store.clock().now();
        let context = match &request.user_context {
            Some(ctx) => ctx.clone(),
            None => self
                .store
                .retrieve_user_context(request.owner(), mission)
                .await
                .unwrap_or_else(|| UserContext::new(request.owner(), mission, now)),
        };

        debug!(mission = %mission, phase = "invoke_engines", "Analysis phase");
        let workshop = Arc::new(request.workshop);
        let partials = self.invoke_engines(Arc::clone(&workshop), Arc::new(context.clone())).await;

        debug!(mission = %mission, phase = "merge", engines = partials.len(), "Analysis phase");
        let merged = merge(&partials);
        let scores = aggregate(&workshop, &merged.signals, self.scoring.target_description_length);

        let mut completed_engines = Vec::new();
        let mut degraded_engines = Vec::new();
        for report in &merged.reports {
            if report.outcome == EngineOutcome::Completed {
                completed_engines.push(report.name.clone());
            } else {
                degraded_engines.push(report.name.clone());
            }
        }

        let result = UnifiedAnalysisResult {
            mission_id: request.mission_id,
            completion: scores.completion,
            quality: scores.quality,
            coherence: scores.coherence,
            compliance: scores.compliance,
            detail_level: scores.detail_level,
            coherence_source: scores.coherence_source,
            suggestions: merged.suggestions,
            next_steps: next_steps(&workshop),
            engines: merged.reports,
            analyzed_at: now,
        };

        Ok(Computed {
            result,
            context,
            completed_engines,
            degraded_engines,
        })
    }

    /// Run every available engine concurrently. Unavailable engines are
    /// reported without being called.
    async fn invoke_engines(
        &self,
        workshop: Arc<WorkshopData>,
        context: Arc<UserContext>,
    ) -> Vec<PartialAnalysisResult> {
        let mut partials: Vec<PartialAnalysisResult> = self
            .registry
            .capabilities()
            .into_iter()
            .filter(|c| !c.available)
            .map(|c| {
                let reason = c.degradation_reason.unwrap_or_else(|| "unavailable".into());
                PartialAnalysisResult::failed(c.name, &EngineError::Unavailable(reason))
            })
            .collect();

        let engines = self.registry.available_engines();
        let mut tasks = JoinSet::new();
        for engine in &engines {
            let engine = Arc::clone(engine);
            let budget = self.engines.timeout_for(engine.name());
            let workshop = Arc::clone(&workshop);
            let context = Arc::clone(&context);
            tasks.spawn(async move { run_guarded(engine.as_ref(), &workshop, &context, budget).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(partial) => partials.push(partial),
                Err(e) => warn!(error = %e, "Engine task lost"),
            }
        }

        for engine in &engines {
            if !partials.iter().any(|p| p.engine == engine.name()) {
                partials.push(PartialAnalysisResult::failed(
                    engine.name(),
                    &EngineError::Failed("engine task lost".into()),
                ));
            }
        }
        partials
    }

    async fn persist(&self, request: &AnalysisRequest, computed: Computed) -> UnifiedAnalysisResult {
        let Computed {
            result,
            mut context,
            completed_engines,
            degraded_engines,
        } = computed;
        let mission = result.mission_id.as_str();
        debug!(mission = %mission, phase = "persist", "Analysis phase");

        let now = self.store.clock().now();
        let gap = chrono::Duration::from_std(self.config.session_gap()).unwrap_or(chrono::Duration::MAX);
        context.touch(now, gap);
        context.record_interaction(
            "analysis",
            format!(
                "completion={:.1} quality={:.1} suggestions={}",
                result.completion,
                result.quality,
                result.suggestions.len()
            ),
            now,
            self.config.history_limit,
        );
        context.set_progress("completion", result.completion / 100.0);
        context.set_progress("quality", result.quality / 100.0);
        context.set_progress("coherence", result.coherence / 100.0);
        context.set_progress("compliance", result.compliance / 100.0);
        self.store.store_user_context(&context).await;

        let snapshot = AnalysisSnapshot {
            completion: result.completion,
            quality: result.quality,
            coherence: result.coherence,
            compliance: result.compliance,
            suggestion_ids: result.suggestions.iter().map(|s| s.id.clone()).collect(),
            engines: completed_engines,
            degraded_engines,
        };
        let priority = Priority::try_from(self.config.analysis_priority).unwrap_or(Priority::High);
        let entry = MemoryEntry::new(
            mission,
            &request.agent_id,
            &request.session_id,
            MemoryContent::Analysis(snapshot),
            now,
        )
        .with_priority(priority)
        .with_tags(["analysis"]);
        if let Err(e) = self.store.store(entry).await {
            warn!(mission = %mission, error = %e, "Failed to persist analysis entry");
        }

        debug!(mission = %mission, phase = "return", "Analysis phase");
        info!(
            mission = %mission,
            completion = result.completion,
            quality = result.quality,
            suggestions = result.suggestions.len(),
            "Analysis complete"
        );
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one engine under a timeout, converting a timeout or a panic into an
/// empty zero-confidence result.
async fn run_guarded(
    engine: &dyn AnalysisEngine,
    workshop: &WorkshopData,
    context: &UserContext,
    budget: Duration,
) -> PartialAnalysisResult {
    let guarded = AssertUnwindSafe(engine.run(workshop, context)).catch_unwind();
    let error = match tokio::time::timeout(budget, guarded).await {
        Ok(Ok(partial)) => return partial,
        Ok(Err(payload)) => EngineError::Panicked(panic_message(payload.as_ref())),
        Err(_) => EngineError::Timeout(budget.as_millis() as u64),
    };
    warn!(engine = %engine.name(), error = %error, "Engine contribution dropped");
    PartialAnalysisResult::failed(engine.name(), &error)
}
