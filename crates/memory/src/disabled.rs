//! Disabled tier — stands in for an unconfigured or unreachable backend.

use async_trait::async_trait;
use atelier_core::context::UserContext;
use atelier_core::error::MemoryError;
use atelier_core::memory::{MemoryEntry, MemoryFilter, MemoryTier, TierLevel};
use chrono::{DateTime, Utc};

/// A tier that refuses every call, so the store degrades to the next one.
pub struct DisabledTier {
    level: TierLevel,
    reason: String,
}

impl DisabledTier {
    pub fn new(level: TierLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn unavailable(&self) -> MemoryError {
        MemoryError::TierUnavailable(format!("{} tier disabled: {}", self.level, self.reason))
    }
}

#[async_trait]
impl MemoryTier for DisabledTier {
    fn name(&self) -> &str {
        "disabled"
    }

    fn level(&self) -> TierLevel {
        self.level
    }

    async fn put(&self, _entry: &MemoryEntry, _now: DateTime<Utc>) -> Result<(), MemoryError> {
        Err(self.unavailable())
    }

    async fn query(
        &self,
        _mission_id: &str,
        _filter: &MemoryFilter,
        _limit: usize,
        _now: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        Err(self.unavailable())
    }

    async fn put_user_context(
        &self,
        _context: &UserContext,
        _ttl: std::time::Duration,
    ) -> Result<(), MemoryError> {
        Err(self.unavailable())
    }

    async fn get_user_context(
        &self,
        _user_id: &str,
        _mission_id: &str,
    ) -> Result<Option<UserContext>, MemoryError> {
        Err(self.unavailable())
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, MemoryError> {
        Err(self.unavailable())
    }

    async fn health_check(&self) -> Result<(), MemoryError> {
        Err(self.unavailable())
    }
}
