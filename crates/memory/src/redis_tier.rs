//! Redis hot tier — volatile, fast, self-expiring.
//!
//! Entries live under keys namespaced by mission, agent, session and kind,
//! so two sessions never read each other's state. Two index sets per entry
//! (mission-wide and per agent) make mission-scoped queries possible
//! without `KEYS` scans; members whose key has expired are pruned lazily
//! on read.

use async_trait::async_trait;
use atelier_core::context::UserContext;
use atelier_core::error::MemoryError;
use atelier_core::memory::{MemoryEntry, MemoryFilter, MemoryTier, TierLevel, sort_for_retrieval};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

/// Key layout of the hot tier.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn entry(&self, entry: &MemoryEntry) -> String {
        format!(
            "{}:memory:{}:{}:{}:{}:{}",
            self.prefix,
            entry.mission_id,
            entry.agent_id,
            entry.session_id,
            entry.kind(),
            entry.id
        )
    }

    pub fn mission_index(&self, mission_id: &str) -> String {
        format!("{}:mission_index:{mission_id}", self.prefix)
    }

    pub fn agent_index(&self, mission_id: &str, agent_id: &str) -> String {
        format!("{}:agent_index:{mission_id}:{agent_id}", self.prefix)
    }

    pub fn user_context(&self, user_id: &str, mission_id: &str) -> String {
        format!("{}:user_context:{user_id}:{mission_id}", self.prefix)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::new("atelier")
    }
}

/// Seconds until `expires_at`, rounded up, at least 1. `None` if already
/// expired.
fn remaining_ttl_secs(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let ms = (expires_at - now).num_milliseconds();
    if ms <= 0 {
        return None;
    }
    Some(((ms as u64).div_ceil(1000)).max(1))
}

fn redis_err(op: &str, e: redis::RedisError) -> MemoryError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        MemoryError::TierUnavailable(format!("Redis {op}: {e}"))
    } else {
        MemoryError::QueryFailed(format!("Redis {op}: {e}"))
    }
}

/// The hot memory tier backed by Redis.
#[derive(Clone)]
pub struct RedisTier {
    conn: ConnectionManager,
    keys: RedisKeys,
}

impl RedisTier {
    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self, MemoryError> {
        let client = redis::Client::open(url)
            .map_err(|e| MemoryError::TierUnavailable(format!("Invalid Redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| MemoryError::TierUnavailable(format!("Redis connect: {e}")))?;
        info!("Redis hot tier connected");
        Ok(Self {
            conn,
            keys: RedisKeys::default(),
        })
    }

    pub fn with_keys(mut self, keys: RedisKeys) -> Self {
        self.keys = keys;
        self
    }
}

#[async_trait]
impl MemoryTier for RedisTier {
    fn name(&self) -> &str {
        "redis"
    }

    fn level(&self) -> TierLevel {
        TierLevel::Hot
    }

    async fn put(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> Result<(), MemoryError> {
        let key = self.keys.entry(entry);
        let json = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Serialization(format!("entry: {e}")))?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        match entry.expires_at {
            Some(at) => {
                let Some(ttl) = remaining_ttl_secs(at, now) else {
                    debug!(id = %entry.id, "Entry already expired, not cached");
                    return Ok(());
                };
                pipe.set_ex(&key, &json, ttl).ignore();
            }
            None => {
                pipe.set(&key, &json).ignore();
            }
        }
        pipe.sadd(self.keys.mission_index(&entry.mission_id), &key)
            .ignore()
            .sadd(self.keys.agent_index(&entry.mission_id, &entry.agent_id), &key)
            .ignore();

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| redis_err("SET", e))
    }

    async fn query(
        &self,
        mission_id: &str,
        filter: &MemoryFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let index = match &filter.agent_id {
            Some(agent) => self.keys.agent_index(mission_id, agent),
            None => self.keys.mission_index(mission_id),
        };

        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .smembers(&index)
            .await
            .map_err(|e| redis_err("SMEMBERS", e))?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("MGET", e))?;

        let mut stale = Vec::new();
        let mut results = Vec::new();
        for (key, value) in keys.iter().zip(values) {
            let Some(json) = value else {
                stale.push(key.as_str());
                continue;
            };
            let entry: MemoryEntry = serde_json::from_str(&json)
                .map_err(|e| MemoryError::Serialization(format!("{key}: {e}")))?;
            if !entry.is_expired(now) && filter.matches(&entry) {
                results.push(entry);
            }
        }

        if !stale.is_empty() {
            debug!(index = %index, pruned = stale.len(), "Pruning expired keys from index");
            conn.srem::<_, _, ()>(&index, stale)
                .await
                .map_err(|e| redis_err("SREM", e))?;
        }

        sort_for_retrieval(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn put_user_context(
        &self,
        context: &UserContext,
        ttl: std::time::Duration,
    ) -> Result<(), MemoryError> {
        let key = self.keys.user_context(&context.user_id, &context.mission_id);
        let json = serde_json::to_string(context)
            .map_err(|e| MemoryError::Serialization(format!("user context: {e}")))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, json, ttl.as_secs().max(1))
            .await
            .map_err(|e| redis_err("SETEX", e))
    }

    async fn get_user_context(
        &self,
        user_id: &str,
        mission_id: &str,
    ) -> Result<Option<UserContext>, MemoryError> {
        let key = self.keys.user_context(user_id, mission_id);
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(&key).await.map_err(|e| redis_err("GET", e))?;
        value
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| MemoryError::Serialization(format!("user context: {e}")))
    }

    async fn health_check(&self) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| redis_err("PING", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::memory::{MemoryContent, MemoryKind, Priority};
    use chrono::Duration;

    fn entry(now: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry::new(
            "m1",
            "a1",
            "s1",
            MemoryContent::Interaction {
                action: "analysis".into(),
                detail: String::new(),
            },
            now,
        )
        .with_id("e1")
    }

    #[test]
    fn keys_namespace_by_mission_agent_session_kind() {
        let keys = RedisKeys::default();
        let key = keys.entry(&entry(Utc::now()));
        assert_eq!(key, "atelier:memory:m1:a1:s1:interaction:e1");
        assert_eq!(keys.mission_index("m1"), "atelier:mission_index:m1");
        assert_eq!(keys.agent_index("m1", "a1"), "atelier:agent_index:m1:a1");
        assert_eq!(keys.user_context("u1", "m1"), "atelier:user_context:u1:m1");
    }

    #[test]
    fn remaining_ttl_rounds_up() {
        let now = Utc::now();
        assert_eq!(remaining_ttl_secs(now + Duration::milliseconds(1500), now), Some(2));
        assert_eq!(remaining_ttl_secs(now + Duration::milliseconds(1), now), Some(1));
        assert_eq!(remaining_ttl_secs(now + Duration::hours(24), now), Some(86_400));
        assert_eq!(remaining_ttl_secs(now, now), None);
        assert_eq!(remaining_ttl_secs(now - Duration::seconds(1), now), None);
    }

    // These tests require a running Redis server
    // Run with: cargo test -p atelier-memory redis_tier -- --ignored

    #[tokio::test]
    #[ignore]
    async fn redis_put_and_query() {
        let tier = RedisTier::connect("redis://127.0.0.1:6379")
            .await
            .unwrap()
            .with_keys(RedisKeys::new(format!("atelier-test-{}", uuid::Uuid::new_v4())));
        let now = Utc::now();
        let e = entry(now).with_priority(Priority::High).with_ttl(Duration::minutes(5));
        tier.put(&e, now).await.unwrap();

        let got = tier
            .query("m1", &MemoryFilter::agent("a1").with_kind(MemoryKind::Interaction), 10, now)
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "e1");

        let later = now + Duration::minutes(10);
        assert!(tier.query("m1", &MemoryFilter::default(), 10, later).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn redis_user_context_roundtrip() {
        let tier = RedisTier::connect("redis://127.0.0.1:6379")
            .await
            .unwrap()
            .with_keys(RedisKeys::new(format!("atelier-test-{}", uuid::Uuid::new_v4())));
        let ctx = UserContext::new("u1", "m1", Utc::now());
        tier.put_user_context(&ctx, std::time::Duration::from_secs(60)).await.unwrap();
        let loaded = tier.get_user_context("u1", "m1").await.unwrap();
        assert_eq!(loaded, Some(ctx));
        assert!(tier.health_check().await.is_ok());
    }
}
