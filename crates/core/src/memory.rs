//! Memory model and the storage tier trait.
//!
//! A [`MemoryEntry`] is one fact an agent should remember about a mission.
//! Its payload is a [`MemoryContent`] variant, and the entry's kind is
//! derived from that variant, so writer and reader always agree on shape.
//!
//! Storage is split across three [`MemoryTier`]s of decreasing speed and
//! increasing locality (hot → warm → cold). The tiers know nothing about
//! each other; fan-out and fallback live in `atelier-memory`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::context::UserContext;
use crate::error::{InvalidInput, MemoryError};

// ── Kinds & priorities ──────────────────────────────────────────────────

/// The kind of a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Context,
    Interaction,
    Analysis,
    Preference,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 4] = [
        MemoryKind::Context,
        MemoryKind::Interaction,
        MemoryKind::Analysis,
        MemoryKind::Preference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Interaction => "interaction",
            Self::Analysis => "analysis",
            Self::Preference => "preference",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| InvalidInput::Malformed(format!("unknown memory kind '{s}'")))
    }
}

/// Retention priority, 1 (low) to 4 (critical).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = InvalidInput;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            4 => Ok(Self::Critical),
            other => Err(InvalidInput::Malformed(format!(
                "priority must be between 1 and 4, got {other}"
            ))),
        }
    }
}

// ── Content ─────────────────────────────────────────────────────────────

/// Typed payload of a memory entry, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MemoryContent {
    /// Where the agent currently is in the workshop.
    Context {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_step: Option<String>,
        #[serde(default)]
        completion: f64,
        #[serde(default)]
        summary: String,
    },

    /// One thing the user or agent did.
    Interaction { action: String, detail: String },

    /// Snapshot of an orchestration result.
    Analysis(AnalysisSnapshot),

    /// User or agent preferences.
    Preference {
        #[serde(default)]
        values: BTreeMap<String, String>,
    },
}

/// Scores and provenance of one analysis cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub completion: f64,
    pub quality: f64,
    pub coherence: f64,
    pub compliance: f64,

    #[serde(default)]
    pub suggestion_ids: Vec<String>,

    /// Engines that contributed a non-empty result.
    #[serde(default)]
    pub engines: Vec<String>,

    /// Engines that failed, timed out or were unavailable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_engines: Vec<String>,
}

impl MemoryContent {
    pub fn kind(&self) -> MemoryKind {
        match self {
            Self::Context { .. } => MemoryKind::Context,
            Self::Interaction { .. } => MemoryKind::Interaction,
            Self::Analysis(_) => MemoryKind::Analysis,
            Self::Preference { .. } => MemoryKind::Preference,
        }
    }
}

// ── Entry ───────────────────────────────────────────────────────────────

/// A single memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique ID for this memory
    pub id: String,

    pub mission_id: String,
    pub agent_id: String,
    pub session_id: String,

    /// Typed payload; determines the entry's kind
    pub content: MemoryContent,

    pub created_at: DateTime<Utc>,

    /// After this instant the entry must never be returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl MemoryEntry {
    /// Create an entry with a fresh id, medium priority and no expiry.
    pub fn new(
        mission_id: impl Into<String>,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        content: MemoryContent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mission_id: mission_id.into(),
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            content,
            created_at: now,
            expires_at: None,
            priority: Priority::default(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Expire `ttl` after creation.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.created_at + ttl);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> MemoryKind {
        self.content.kind()
    }

    /// An entry is expired once the clock reaches its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.id.trim().is_empty() {
            return Err(InvalidInput::MissingField("id"));
        }
        if self.mission_id.trim().is_empty() {
            return Err(InvalidInput::MissingField("mission_id"));
        }
        if self.agent_id.trim().is_empty() {
            return Err(InvalidInput::MissingField("agent_id"));
        }
        if let Some(at) = self.expires_at {
            if at <= self.created_at {
                return Err(InvalidInput::ExpiryBeforeCreation(self.id.clone()));
            }
        }
        Ok(())
    }
}

/// Order entries for retrieval: priority descending, then newest first,
/// then id ascending so equal entries have a stable order.
pub fn sort_for_retrieval(entries: &mut [MemoryEntry]) {
    entries.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ── Queries ─────────────────────────────────────────────────────────────

/// Optional narrowing of a mission-scoped retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MemoryKind>,
}

impl MemoryFilter {
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Does `entry` satisfy every set field of the filter?
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        self.agent_id.as_ref().is_none_or(|a| *a == entry.agent_id)
            && self.session_id.as_ref().is_none_or(|s| *s == entry.session_id)
            && self.kind.is_none_or(|k| k == entry.kind())
    }
}

// ── Tier trait ──────────────────────────────────────────────────────────

/// Position of a tier in the latency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierLevel {
    Hot,
    Warm,
    Cold,
}

impl TierLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

impl fmt::Display for TierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One storage backend of the tiered memory store.
///
/// Implementations must be safe for concurrent use without external
/// locking. Errors are reported, never panicked; the store decides how to
/// degrade.
#[async_trait]
pub trait MemoryTier: Send + Sync {
    /// Human-readable backend name (e.g. "redis", "sqlite", "in_process").
    fn name(&self) -> &str;

    fn level(&self) -> TierLevel;

    /// Insert or overwrite an entry (keyed by id).
    async fn put(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> Result<(), MemoryError>;

    /// Non-expired entries of a mission matching `filter`, in retrieval
    /// order, at most `limit`.
    async fn query(
        &self,
        mission_id: &str,
        filter: &MemoryFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Overwrite the context stored for `(context.user_id, context.mission_id)`.
    async fn put_user_context(
        &self,
        context: &UserContext,
        ttl: std::time::Duration,
    ) -> Result<(), MemoryError>;

    async fn get_user_context(
        &self,
        user_id: &str,
        mission_id: &str,
    ) -> Result<Option<UserContext>, MemoryError>;

    /// Delete expired entries, returning how many were removed.
    /// Self-expiring tiers keep the default no-op.
    async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, MemoryError> {
        Ok(0)
    }

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<(), MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(step: &str) -> MemoryContent {
        MemoryContent::Context {
            current_step: Some(step.into()),
            completion: 50.0,
            summary: String::new(),
        }
    }

    #[test]
    fn kind_follows_content() {
        let now = Utc::now();
        let entry = MemoryEntry::new("m1", "a1", "s1", context("assets"), now);
        assert_eq!(entry.kind(), MemoryKind::Context);

        let analysis = MemoryEntry::new(
            "m1",
            "a1",
            "s1",
            MemoryContent::Analysis(AnalysisSnapshot::default()),
            now,
        );
        assert_eq!(analysis.kind(), MemoryKind::Analysis);
    }

    #[test]
    fn content_serializes_as_tagged_union() {
        let content = MemoryContent::Interaction {
            action: "analysis".into(),
            detail: "completion 75".into(),
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["kind"], "interaction");
        assert_eq!(json["data"]["action"], "analysis");

        let back: MemoryContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let json = serde_json::json!({ "kind": "interaction", "data": { "values": {} } });
        assert!(serde_json::from_value::<MemoryContent>(json).is_err());
    }

    #[test]
    fn priority_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "4");
        let p: Priority = serde_json::from_str("1").unwrap();
        assert_eq!(p, Priority::Low);
        assert!(serde_json::from_str::<Priority>("7").is_err());
    }

    #[test]
    fn expiry_must_follow_creation() {
        let now = Utc::now();
        let entry = MemoryEntry::new("m1", "a1", "s1", context("x"), now).with_expiry(now);
        assert!(matches!(
            entry.validate(),
            Err(InvalidInput::ExpiryBeforeCreation(_))
        ));

        let ok = MemoryEntry::new("m1", "a1", "s1", context("x"), now).with_ttl(Duration::hours(1));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn empty_mission_is_invalid() {
        let entry = MemoryEntry::new("  ", "a1", "s1", context("x"), Utc::now());
        assert_eq!(entry.validate(), Err(InvalidInput::MissingField("mission_id")));
    }

    #[test]
    fn expired_exactly_at_expiry() {
        let now = Utc::now();
        let entry = MemoryEntry::new("m1", "a1", "s1", context("x"), now)
            .with_ttl(Duration::seconds(10));
        assert!(!entry.is_expired(now + Duration::seconds(9)));
        assert!(entry.is_expired(now + Duration::seconds(10)));
    }

    #[test]
    fn retrieval_order_is_priority_then_recency() {
        let now = Utc::now();
        let mut entries = vec![
            MemoryEntry::new("m", "a", "s", context("old-low"), now).with_priority(Priority::Low),
            MemoryEntry::new("m", "a", "s", context("new-low"), now + Duration::seconds(5))
                .with_priority(Priority::Low),
            MemoryEntry::new("m", "a", "s", context("crit"), now).with_priority(Priority::Critical),
        ];
        sort_for_retrieval(&mut entries);
        assert_eq!(entries[0].priority, Priority::Critical);
        assert_eq!(entries[1].created_at, now + Duration::seconds(5));
        assert_eq!(entries[2].created_at, now);
    }

    #[test]
    fn filter_matches_set_fields_only() {
        let entry = MemoryEntry::new("m", "a1", "s1", context("x"), Utc::now());
        assert!(MemoryFilter::default().matches(&entry));
        assert!(MemoryFilter::agent("a1").with_kind(MemoryKind::Context).matches(&entry));
        assert!(!MemoryFilter::agent("a2").matches(&entry));
        assert!(!MemoryFilter::agent("a1").with_session("s2").matches(&entry));
        assert!(!MemoryFilter::default().with_kind(MemoryKind::Analysis).matches(&entry));
    }

    #[test]
    fn kind_parses_from_str() {
        assert_eq!("analysis".parse::<MemoryKind>().unwrap(), MemoryKind::Analysis);
        assert!("nope".parse::<MemoryKind>().is_err());
    }
}
