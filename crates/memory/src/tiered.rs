//! The tiered memory store — fan-out writes, first-hit reads.
//!
//! ```text
//!   store()     ──► hot ──► warm ──► cold      (every reachable tier)
//!   retrieve()  ──► hot ─┬─► warm ─┬─► cold    (first non-empty tier wins)
//!                        └ empty / failed ┘
//! ```
//!
//! Every tier call is bounded by the I/O timeout. A failed or timed-out
//! call is logged and the store moves on, so the public API never fails
//! because of a tier. The cold tier lives in-process and always accepts
//! writes.

use crate::disabled::DisabledTier;
use crate::in_memory::InProcessTier;
#[cfg(feature = "redis")]
use crate::redis_tier::RedisTier;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteTier;
use atelier_config::MemoryConfig;
use atelier_core::clock::{Clock, SystemClock};
use atelier_core::context::UserContext;
use atelier_core::error::{InvalidInput, MemoryError};
use atelier_core::memory::{MemoryEntry, MemoryFilter, MemoryTier, TierLevel, sort_for_retrieval};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Health of one tier, as reported by [`TieredMemoryStore::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    pub level: TierLevel,
    pub backend: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Entries removed by one sweep, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub warm: usize,
    pub cold: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.warm + self.cold
    }
}

/// Three-tier memory store with transparent degradation.
pub struct TieredMemoryStore {
    hot: Arc<dyn MemoryTier>,
    warm: Arc<dyn MemoryTier>,
    cold: Arc<InProcessTier>,
    clock: Arc<dyn Clock>,
    io_timeout: Duration,
    default_ttl: Option<chrono::Duration>,
    user_context_ttl: Duration,
}

impl TieredMemoryStore {
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(500);
    pub const DEFAULT_USER_CONTEXT_TTL: Duration = Duration::from_secs(3600);

    /// A store with only the in-process tier; hot and warm are disabled
    /// until attached.
    pub fn new(cold: InProcessTier) -> Self {
        Self {
            hot: Arc::new(DisabledTier::new(TierLevel::Hot, "not configured")),
            warm: Arc::new(DisabledTier::new(TierLevel::Warm, "not configured")),
            cold: Arc::new(cold),
            clock: Arc::new(SystemClock),
            io_timeout: Self::DEFAULT_IO_TIMEOUT,
            default_ttl: Some(chrono::Duration::hours(24)),
            user_context_ttl: Self::DEFAULT_USER_CONTEXT_TTL,
        }
    }

    pub fn with_hot(mut self, tier: Arc<dyn MemoryTier>) -> Self {
        self.hot = tier;
        self
    }

    pub fn with_warm(mut self, tier: Arc<dyn MemoryTier>) -> Self {
        self.warm = tier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// TTL applied to entries stored without an expiry. `None` keeps them
    /// until capacity eviction.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl.and_then(|d| chrono::Duration::from_std(d).ok());
        self
    }

    pub fn with_user_context_ttl(mut self, ttl: Duration) -> Self {
        self.user_context_ttl = ttl;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Tiers in latency order.
    fn tiers(&self) -> [&dyn MemoryTier; 3] {
        [self.hot.as_ref(), self.warm.as_ref(), self.cold.as_ref()]
    }

    /// Run one tier call under the I/O timeout, logging and absorbing failure.
    async fn guarded<T>(
        &self,
        tier: &dyn MemoryTier,
        op: &'static str,
        call: impl Future<Output = Result<T, MemoryError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.io_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(
                    tier = %tier.level(),
                    backend = %tier.name(),
                    op,
                    error = %e,
                    "Tier call failed, degrading to next tier"
                );
                None
            }
            Err(_) => {
                let e = MemoryError::Timeout {
                    tier: tier.level().to_string(),
                    millis: self.io_timeout.as_millis() as u64,
                };
                warn!(
                    tier = %tier.level(),
                    backend = %tier.name(),
                    op,
                    error = %e,
                    "Tier call timed out, degrading to next tier"
                );
                None
            }
        }
    }

    /// Write `entry` to every reachable tier, hot to cold.
    ///
    /// Applies the default TTL when the entry has no expiry. Only a
    /// structurally invalid entry is an error; the cold tier guarantees
    /// the write lands somewhere.
    pub async fn store(&self, mut entry: MemoryEntry) -> Result<String, InvalidInput> {
        if entry.expires_at.is_none() {
            if let Some(ttl) = self.default_ttl {
                entry.expires_at = Some(entry.created_at + ttl);
            }
        }
        entry.validate()?;

        let now = self.clock.now();
        let mut accepted = Vec::with_capacity(3);
        for tier in self.tiers() {
            if self.guarded(tier, "put", tier.put(&entry, now)).await.is_some() {
                accepted.push(tier.level().as_str());
            }
        }
        if accepted.is_empty() {
            warn!(id = %entry.id, kind = %entry.kind(), "No tier accepted memory entry");
        } else {
            debug!(id = %entry.id, kind = %entry.kind(), tiers = ?accepted, "Stored memory entry");
        }
        Ok(entry.id)
    }

    /// Entries of `mission_id` matching `filter`, from the first tier that
    /// has any live ones. Sorted by priority desc, then newest first, and
    /// truncated to `limit`.
    pub async fn retrieve(
        &self,
        mission_id: &str,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, InvalidInput> {
        if mission_id.trim().is_empty() {
            return Err(InvalidInput::MissingField("mission_id"));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        for tier in self.tiers() {
            let Some(mut entries) = self
                .guarded(tier, "query", tier.query(mission_id, filter, limit, now))
                .await
            else {
                continue;
            };
            entries.retain(|e| !e.is_expired(now) && filter.matches(e));
            if entries.is_empty() {
                continue;
            }
            sort_for_retrieval(&mut entries);
            entries.truncate(limit);
            debug!(mission = %mission_id, tier = %tier.level(), hits = entries.len(), "Retrieved memory");
            return Ok(entries);
        }
        Ok(Vec::new())
    }

    /// Overwrite the stored context for `(user, mission)` in every
    /// reachable tier.
    pub async fn store_user_context(&self, context: &UserContext) {
        for tier in self.tiers() {
            self.guarded(
                tier,
                "put_user_context",
                tier.put_user_context(context, self.user_context_ttl),
            )
            .await;
        }
    }

    /// The stored context, hot tier first, then warm, then in-process.
    pub async fn retrieve_user_context(
        &self,
        user_id: &str,
        mission_id: &str,
    ) -> Option<UserContext> {
        for tier in self.tiers() {
            if let Some(Some(context)) = self
                .guarded(tier, "get_user_context", tier.get_user_context(user_id, mission_id))
                .await
            {
                return Some(context);
            }
        }
        None
    }

    /// Delete expired entries from the warm and cold tiers. The hot tier
    /// expires entries natively.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let warm = self
            .guarded(self.warm.as_ref(), "sweep", self.warm.sweep(now))
            .await
            .unwrap_or(0);
        let cold = self
            .guarded(self.cold.as_ref(), "sweep", self.cold.sweep(now))
            .await
            .unwrap_or(0);
        let report = SweepReport { warm, cold };
        if report.total() > 0 {
            debug!(warm, cold, "Swept expired memory entries");
        }
        report
    }

    /// Reachability of each tier.
    pub async fn status(&self) -> Vec<TierStatus> {
        let mut statuses = Vec::with_capacity(3);
        for tier in self.tiers() {
            let result = match tokio::time::timeout(self.io_timeout, tier.health_check()).await {
                Ok(result) => result,
                Err(_) => Err(MemoryError::Timeout {
                    tier: tier.level().to_string(),
                    millis: self.io_timeout.as_millis() as u64,
                }),
            };
            statuses.push(TierStatus {
                level: tier.level(),
                backend: tier.name().to_string(),
                healthy: result.is_ok(),
                detail: result.err().map(|e| e.to_string()),
            });
        }
        statuses
    }
}

impl TieredMemoryStore {
    /// Build the store from configuration.
    ///
    /// A hot or warm tier that is unconfigured or cannot be reached at
    /// startup is replaced by a [`DisabledTier`]; the store still starts.
    pub async fn from_config(config: &MemoryConfig) -> Self {
        let store = Self::new(InProcessTier::new(config.cold_capacity_per_bucket))
            .with_io_timeout(config.tier_io_timeout())
            .with_default_ttl(config.default_ttl())
            .with_user_context_ttl(config.user_context_ttl());

        let hot = Self::connect_hot(config).await;
        let warm = Self::connect_warm(config).await;
        store.with_hot(hot).with_warm(warm)
    }

    #[cfg(feature = "redis")]
    async fn connect_hot(config: &MemoryConfig) -> Arc<dyn MemoryTier> {
        let Some(url) = config.redis_url.as_deref() else {
            return Arc::new(DisabledTier::new(TierLevel::Hot, "no redis_url configured"));
        };
        match tokio::time::timeout(config.tier_io_timeout() * 4, RedisTier::connect(url)).await {
            Ok(Ok(tier)) => Arc::new(tier),
            Ok(Err(e)) => {
                warn!(error = %e, "Hot tier unavailable, continuing without it");
                Arc::new(DisabledTier::new(TierLevel::Hot, e.to_string()))
            }
            Err(_) => {
                warn!("Hot tier connection timed out, continuing without it");
                Arc::new(DisabledTier::new(TierLevel::Hot, "connection timed out"))
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_hot(_config: &MemoryConfig) -> Arc<dyn MemoryTier> {
        Arc::new(DisabledTier::new(TierLevel::Hot, "built without redis support"))
    }

    #[cfg(feature = "sqlite")]
    async fn connect_warm(config: &MemoryConfig) -> Arc<dyn MemoryTier> {
        let Some(url) = config.database_url.as_deref() else {
            return Arc::new(DisabledTier::new(TierLevel::Warm, "no database_url configured"));
        };
        match SqliteTier::new(url, config.warm_max_entries).await {
            Ok(tier) => Arc::new(tier),
            Err(e) => {
                warn!(error = %e, "Warm tier unavailable, continuing without it");
                Arc::new(DisabledTier::new(TierLevel::Warm, e.to_string()))
            }
        }
    }

    #[cfg(not(feature = "sqlite"))]
    async fn connect_warm(_config: &MemoryConfig) -> Arc<dyn MemoryTier> {
        Arc::new(DisabledTier::new(TierLevel::Warm, "built without sqlite support"))
    }
}
