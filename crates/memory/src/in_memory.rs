//! In-process tier — the cold fallback that always accepts writes.
//!
//! Entries are grouped in buckets keyed by `(mission, agent)`. Each bucket
//! sits behind its own mutex, so concurrent orchestration calls for
//! different agents never contend. A bucket holds at most `capacity`
//! entries; beyond that the lowest-priority, oldest entries are evicted.

use async_trait::async_trait;
use atelier_core::context::UserContext;
use atelier_core::error::MemoryError;
use atelier_core::memory::{
    MemoryEntry, MemoryFilter, MemoryTier, TierLevel, sort_for_retrieval,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

type BucketKey = (String, String);
type Bucket = Arc<Mutex<Vec<MemoryEntry>>>;

/// A user context and the instant after which sweeping drops it.
struct HeldContext {
    context: UserContext,
    expires_at: Option<DateTime<Utc>>,
}

/// The in-process memory tier.
pub struct InProcessTier {
    buckets: RwLock<HashMap<BucketKey, Bucket>>,
    contexts: RwLock<HashMap<(String, String), HeldContext>>,
    capacity: usize,
}

impl InProcessTier {
    /// Default entries retained per `(mission, agent)` bucket.
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            contexts: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries held, expired or not.
    pub async fn len(&self) -> usize {
        let buckets: Vec<Bucket> = self.buckets.read().await.values().cloned().collect();
        let mut total = 0;
        for bucket in buckets {
            total += bucket.lock().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn bucket(&self, mission_id: &str, agent_id: &str) -> Bucket {
        let key = (mission_id.to_string(), agent_id.to_string());
        if let Some(bucket) = self.buckets.read().await.get(&key) {
            return bucket.clone();
        }
        self.buckets.write().await.entry(key).or_default().clone()
    }

    /// Buckets of a mission, optionally narrowed to one agent.
    async fn mission_buckets(&self, mission_id: &str, agent_id: Option<&str>) -> Vec<Bucket> {
        self.buckets
            .read()
            .await
            .iter()
            .filter(|((m, a), _)| m == mission_id && agent_id.is_none_or(|want| a == want))
            .map(|(_, b)| b.clone())
            .collect()
    }
}

#[cfg(test)]
impl InProcessTier {
    /// Hold the bucket map exclusively; entry calls block until the guard drops.
    pub(crate) async fn freeze(&self) -> tokio::sync::RwLockWriteGuard<'_, HashMap<BucketKey, Bucket>> {
        self.buckets.write().await
    }
}

impl Default for InProcessTier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Drop expired entries, then evict lowest-priority-oldest down to `capacity`.
fn enforce_capacity(entries: &mut Vec<MemoryEntry>, capacity: usize, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    if before <= capacity {
        return 0;
    }
    entries.retain(|e| !e.is_expired(now));
    if entries.len() > capacity {
        sort_for_retrieval(entries);
        entries.truncate(capacity);
    }
    before - entries.len()
}

#[async_trait]
impl MemoryTier for InProcessTier {
    fn name(&self) -> &str {
        "in_process"
    }

    fn level(&self) -> TierLevel {
        TierLevel::Cold
    }

    async fn put(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> Result<(), MemoryError> {
        let bucket = self.bucket(&entry.mission_id, &entry.agent_id).await;
        let mut entries = bucket.lock().await;
        entries.retain(|e| e.id != entry.id);
        entries.push(entry.clone());

        let evicted = enforce_capacity(&mut entries, self.capacity, now);
        if evicted > 0 {
            debug!(
                mission = %entry.mission_id,
                agent = %entry.agent_id,
                evicted,
                "In-process bucket over capacity, evicted entries"
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        mission_id: &str,
        filter: &MemoryFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut results = Vec::new();
        for bucket in self.mission_buckets(mission_id, filter.agent_id.as_deref()).await {
            let entries = bucket.lock().await;
            results.extend(
                entries
                    .iter()
                    .filter(|e| !e.is_expired(now) && filter.matches(e))
                    .cloned(),
            );
        }
        sort_for_retrieval(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    /// The context expires `ttl` after its last activity; a zero `ttl`
    /// keeps it until overwritten.
    async fn put_user_context(
        &self,
        context: &UserContext,
        ttl: std::time::Duration,
    ) -> Result<(), MemoryError> {
        let expires_at = (!ttl.is_zero()).then(|| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| context.last_activity.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        self.contexts.write().await.insert(
            (context.user_id.clone(), context.mission_id.clone()),
            HeldContext {
                context: context.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_user_context(
        &self,
        user_id: &str,
        mission_id: &str,
    ) -> Result<Option<UserContext>, MemoryError> {
        Ok(self
            .contexts
            .read()
            .await
            .get(&(user_id.to_string(), mission_id.to_string()))
            .map(|held| held.context.clone()))
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, MemoryError> {
        let buckets: Vec<Bucket> = self.buckets.read().await.values().cloned().collect();
        let mut removed = 0;
        for bucket in buckets {
            let mut entries = bucket.lock().await;
            let before = entries.len();
            entries.retain(|e| !e.is_expired(now));
            removed += before - entries.len();
        }

        // A bucket only the map still references has no call in flight.
        let mut buckets = self.buckets.write().await;
        let held = buckets.len();
        buckets.retain(|_, bucket| {
            Arc::strong_count(bucket) > 1 || bucket.try_lock().map_or(true, |entries| !entries.is_empty())
        });
        let dropped_buckets = held - buckets.len();
        drop(buckets);

        let mut contexts = self.contexts.write().await;
        let held = contexts.len();
        contexts.retain(|_, c| c.expires_at.is_none_or(|at| at > now));
        let dropped_contexts = held - contexts.len();

        if dropped_buckets + dropped_contexts > 0 {
            debug!(dropped_buckets, dropped_contexts, "In-process tier compacted");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::memory::{MemoryContent, MemoryKind, Priority};
    use chrono::Duration;

    fn entry(agent: &str, step: &str, priority: Priority, at: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry::new(
            "m1",
            agent,
            "s1",
            MemoryContent::Context {
                current_step: Some(step.into()),
                completion: 0.0,
                summary: String::new(),
            },
            at,
        )
        .with_priority(priority)
    }

    #[tokio::test]
    async fn put_and_query() {
        let tier = InProcessTier::default();
        let now = Utc::now();
        tier.put(&entry("a1", "one", Priority::Medium, now), now).await.unwrap();
        tier.put(&entry("a2", "two", Priority::Medium, now), now).await.unwrap();

        let all = tier.query("m1", &MemoryFilter::default(), 10, now).await.unwrap();
        assert_eq!(all.len(), 2);

        let a1 = tier.query("m1", &MemoryFilter::agent("a1"), 10, now).await.unwrap();
        assert_eq!(a1.len(), 1);
        assert_eq!(a1[0].agent_id, "a1");

        let other = tier.query("m2", &MemoryFilter::default(), 10, now).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn put_overwrites_same_id() {
        let tier = InProcessTier::default();
        let now = Utc::now();
        let first = entry("a1", "one", Priority::Low, now).with_id("fixed");
        let second = entry("a1", "two", Priority::High, now).with_id("fixed");
        tier.put(&first, now).await.unwrap();
        tier.put(&second, now).await.unwrap();

        let all = tier.query("m1", &MemoryFilter::default(), 10, now).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn capacity_evicts_lowest_priority_oldest() {
        let tier = InProcessTier::new(3);
        let t0 = Utc::now();
        tier.put(&entry("a1", "old-low", Priority::Low, t0).with_id("old-low"), t0)
            .await
            .unwrap();
        tier.put(
            &entry("a1", "new-low", Priority::Low, t0 + Duration::seconds(1)).with_id("new-low"),
            t0,
        )
        .await
        .unwrap();
        tier.put(&entry("a1", "high", Priority::High, t0).with_id("high"), t0)
            .await
            .unwrap();
        tier.put(&entry("a1", "crit", Priority::Critical, t0).with_id("crit"), t0)
            .await
            .unwrap();

        let ids: Vec<String> = tier
            .query("m1", &MemoryFilter::default(), 10, t0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["crit", "high", "new-low"]);
    }

    #[tokio::test]
    async fn capacity_is_per_bucket() {
        let tier = InProcessTier::new(2);
        let now = Utc::now();
        for i in 0..3 {
            tier.put(&entry("a1", &format!("a1-{i}"), Priority::Medium, now), now)
                .await
                .unwrap();
            tier.put(&entry("a2", &format!("a2-{i}"), Priority::Medium, now), now)
                .await
                .unwrap();
        }
        assert_eq!(tier.len().await, 4);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_before_live_ones() {
        let tier = InProcessTier::new(2);
        let t0 = Utc::now();
        let short = entry("a1", "short", Priority::Critical, t0)
            .with_id("short")
            .with_ttl(Duration::seconds(5));
        tier.put(&short, t0).await.unwrap();
        tier.put(&entry("a1", "b", Priority::Low, t0).with_id("b"), t0).await.unwrap();

        let later = t0 + Duration::seconds(10);
        tier.put(&entry("a1", "c", Priority::Low, later).with_id("c"), later)
            .await
            .unwrap();

        assert_eq!(tier.len().await, 2);
        let ids: Vec<String> = tier
            .query("m1", &MemoryFilter::default(), 10, later)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn query_hides_expired_and_filters_kind() {
        let tier = InProcessTier::default();
        let t0 = Utc::now();
        tier.put(&entry("a1", "x", Priority::Medium, t0).with_ttl(Duration::minutes(1)), t0)
            .await
            .unwrap();

        let later = t0 + Duration::minutes(2);
        let results = tier.query("m1", &MemoryFilter::default(), 10, later).await.unwrap();
        assert!(results.is_empty());

        let analysis = tier
            .query("m1", &MemoryFilter::default().with_kind(MemoryKind::Analysis), 10, t0)
            .await
            .unwrap();
        assert!(analysis.is_empty());
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let tier = InProcessTier::default();
        let t0 = Utc::now();
        tier.put(&entry("a1", "x", Priority::Medium, t0).with_ttl(Duration::minutes(1)), t0)
            .await
            .unwrap();
        tier.put(&entry("a1", "y", Priority::Medium, t0), t0).await.unwrap();

        let later = t0 + Duration::minutes(5);
        assert_eq!(tier.sweep(later).await.unwrap(), 1);
        assert_eq!(tier.sweep(later).await.unwrap(), 0);
        assert_eq!(tier.len().await, 1);
    }

    #[tokio::test]
    async fn user_context_overwrites() {
        let tier = InProcessTier::default();
        let now = Utc::now();
        let mut ctx = UserContext::new("u1", "m1", now);
        tier.put_user_context(&ctx, std::time::Duration::from_secs(60)).await.unwrap();
        ctx.session_count = 7;
        tier.put_user_context(&ctx, std::time::Duration::from_secs(60)).await.unwrap();

        let loaded = tier.get_user_context("u1", "m1").await.unwrap().unwrap();
        assert_eq!(loaded.session_count, 7);
        assert!(tier.get_user_context("u1", "m2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_entries() {
        let tier = Arc::new(InProcessTier::new(1000));
        let now = Utc::now();
        let mut handles = Vec::new();
        for i in 0..8 {
            let tier = tier.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    let e = entry("a1", &format!("{i}-{j}"), Priority::Medium, now);
                    tier.put(&e, now).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(tier.len().await, 80);
    }

    #[tokio::test]
    async fn sweep_drops_emptied_buckets() {
        let tier = InProcessTier::default();
        let now = Utc::now();
        let short = entry("a1", "s1", Priority::Low, now).with_ttl(Duration::seconds(10));
        tier.put(&short, now).await.unwrap();
        tier.put(&entry("a2", "s1", Priority::Low, now), now).await.unwrap();
        assert_eq!(tier.buckets.read().await.len(), 2);

        assert_eq!(tier.sweep(now + Duration::seconds(11)).await.unwrap(), 1);
        let buckets = tier.buckets.read().await;
        assert_eq!(buckets.len(), 1);
        assert!(buckets.contains_key(&("m1".to_string(), "a2".to_string())));
    }

    #[tokio::test]
    async fn user_contexts_expire_on_sweep() {
        let tier = InProcessTier::default();
        let now = Utc::now();
        let ttl = std::time::Duration::from_secs(60);
        tier.put_user_context(&UserContext::new("u1", "m1", now), ttl).await.unwrap();
        tier.put_user_context(&UserContext::new("u2", "m1", now), std::time::Duration::ZERO)
            .await
            .unwrap();

        tier.sweep(now + Duration::seconds(30)).await.unwrap();
        assert!(tier.get_user_context("u1", "m1").await.unwrap().is_some());

        tier.sweep(now + Duration::seconds(61)).await.unwrap();
        assert!(tier.get_user_context("u1", "m1").await.unwrap().is_none());
        assert!(tier.get_user_context("u2", "m1").await.unwrap().is_some());
    }
}
