//! Configuration loading, validation, and management for Atelier.
//!
//! Loads configuration from `~/.atelier/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.atelier/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tiered memory store
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Analysis engines
    #[serde(default)]
    pub engines: EnginesConfig,

    /// Score aggregation thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Orchestration behaviour
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

// ── Memory ──────────────────────────────────────────────────────────────

/// Tiered memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Hot tier (Redis). Absent disables the tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    /// Warm tier (SQLite). Absent disables the tier.
    #[serde(default = "default_database_url", skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// TTL applied to entries stored without an explicit expiry (0 = none)
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: u64,

    /// Hot-tier TTL of stored user contexts
    #[serde(default = "default_user_context_ttl_secs")]
    pub user_context_ttl_secs: u64,

    /// Entries retained per (mission, agent) in the in-process tier
    #[serde(default = "default_cold_capacity")]
    pub cold_capacity_per_bucket: usize,

    /// Entries retained in the warm tier before lowest-priority-oldest eviction
    #[serde(default = "default_warm_max_entries")]
    pub warm_max_entries: usize,

    /// Upper bound on any single tier call
    #[serde(default = "default_tier_io_timeout_ms")]
    pub tier_io_timeout_ms: u64,

    /// Interval between background expiry sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_database_url() -> Option<String> {
    Some(format!(
        "sqlite://{}",
        AppConfig::config_dir().join("memory.sqlite").display()
    ))
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_user_context_ttl_secs() -> u64 {
    3600
}

fn default_cold_capacity() -> usize {
    100
}

fn default_warm_max_entries() -> usize {
    100_000
}

fn default_tier_io_timeout_ms() -> u64 {
    500
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            database_url: default_database_url(),
            default_ttl_hours: default_ttl_hours(),
            user_context_ttl_secs: default_user_context_ttl_secs(),
            cold_capacity_per_bucket: default_cold_capacity(),
            warm_max_entries: default_warm_max_entries(),
            tier_io_timeout_ms: default_tier_io_timeout_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl MemoryConfig {
    /// `None` when entries without an expiry should live until evicted.
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_hours > 0).then(|| Duration::from_secs(self.default_ttl_hours * 3600))
    }

    pub fn user_context_ttl(&self) -> Duration {
        Duration::from_secs(self.user_context_ttl_secs)
    }

    pub fn tier_io_timeout(&self) -> Duration {
        Duration::from_millis(self.tier_io_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// ── Engines ─────────────────────────────────────────────────────────────

/// Analysis engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// Per-call budget for engines without their own timeout
    #[serde(default = "default_engine_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default)]
    pub rule_based: EngineToggle,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub statistical: EngineToggle,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

fn default_engine_timeout_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_engine_timeout_ms(),
            rule_based: EngineToggle::default(),
            semantic: SemanticConfig::default(),
            statistical: EngineToggle::default(),
            knowledge: KnowledgeConfig::default(),
        }
    }
}

impl EnginesConfig {
    /// Timeout for the named engine, falling back to the default budget.
    pub fn timeout_for(&self, engine: &str) -> Duration {
        let specific = match engine {
            "rule_based" => self.rule_based.timeout_ms,
            "semantic" => self.semantic.timeout_ms,
            "statistical" => self.statistical.timeout_ms,
            "knowledge" => self.knowledge.timeout_ms,
            _ => None,
        };
        Duration::from_millis(specific.unwrap_or(self.default_timeout_ms))
    }
}

/// Enable flag and optional timeout shared by every engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for EngineToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: None,
        }
    }
}

/// Semantic similarity engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Hashed embedding width
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_dimensions() -> usize {
    256
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: None,
            dimensions: default_dimensions(),
        }
    }
}

/// Knowledge retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// JSON file of documents replacing the built-in knowledge base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_path: Option<PathBuf>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: None,
            knowledge_base_path: None,
        }
    }
}

// ── Scoring & orchestration ─────────────────────────────────────────────

/// Score aggregation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Average description length that maps to a detail level of 100
    #[serde(default = "default_target_description_length")]
    pub target_description_length: usize,

    /// Descriptions shorter than this count as thin
    #[serde(default = "default_min_description_length")]
    pub min_description_length: usize,
}

fn default_target_description_length() -> usize {
    100
}

fn default_min_description_length() -> usize {
    50
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            target_description_length: default_target_description_length(),
            min_description_length: default_min_description_length(),
        }
    }
}

/// Orchestration behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Interactions kept in a user context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Inactivity after which the next call opens a new session
    #[serde(default = "default_session_gap_minutes")]
    pub session_gap_minutes: u64,

    /// Priority (1-4) of persisted analysis entries
    #[serde(default = "default_analysis_priority")]
    pub analysis_priority: u8,
}

fn default_history_limit() -> usize {
    50
}

fn default_session_gap_minutes() -> u64 {
    30
}

fn default_analysis_priority() -> u8 {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            session_gap_minutes: default_session_gap_minutes(),
            analysis_priority: default_analysis_priority(),
        }
    }
}

impl OrchestratorConfig {
    pub fn session_gap(&self) -> Duration {
        Duration::from_secs(self.session_gap_minutes * 60)
    }
}

// ── Loading ─────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.atelier/config.toml).
    ///
    /// Environment variables override the file:
    /// - `ATELIER_REDIS_URL`
    /// - `ATELIER_DATABASE_URL`
    /// - `ATELIER_ENGINE_TIMEOUT_MS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("ATELIER_REDIS_URL") {
            self.memory.redis_url = (!url.is_empty()).then_some(url);
        }
        if let Some(url) = lookup("ATELIER_DATABASE_URL") {
            self.memory.database_url = (!url.is_empty()).then_some(url);
        }
        if let Some(ms) = lookup("ATELIER_ENGINE_TIMEOUT_MS") {
            self.engines.default_timeout_ms = ms.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "ATELIER_ENGINE_TIMEOUT_MS must be an integer, got '{ms}'"
                ))
            })?;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".atelier")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engines.default_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engines.default_timeout_ms must be > 0".into(),
            ));
        }
        let engine_timeouts = [
            self.engines.rule_based.timeout_ms,
            self.engines.semantic.timeout_ms,
            self.engines.statistical.timeout_ms,
            self.engines.knowledge.timeout_ms,
        ];
        if engine_timeouts.contains(&Some(0)) {
            return Err(ConfigError::ValidationError(
                "engine timeout_ms must be > 0".into(),
            ));
        }
        if self.engines.semantic.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "engines.semantic.dimensions must be > 0".into(),
            ));
        }
        if self.memory.tier_io_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "memory.tier_io_timeout_ms must be > 0".into(),
            ));
        }
        if self.memory.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "memory.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.memory.cold_capacity_per_bucket == 0 || self.memory.warm_max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "memory capacities must be > 0".into(),
            ));
        }
        if self.scoring.target_description_length == 0 {
            return Err(ConfigError::ValidationError(
                "scoring.target_description_length must be > 0".into(),
            ));
        }
        if !(1..=4).contains(&self.orchestrator.analysis_priority) {
            return Err(ConfigError::ValidationError(
                "orchestrator.analysis_priority must be between 1 and 4".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
