//! SQLite warm tier — durable relational storage.
//!
//! Two tables:
//! - `agent_memory` — one row per entry, content stored as tagged JSON
//! - `user_context` — one row per (user, mission), overwritten on save
//!
//! Timestamps are epoch milliseconds so expiry checks and ordering happen
//! in SQL.

use async_trait::async_trait;
use atelier_core::context::UserContext;
use atelier_core::error::MemoryError;
use atelier_core::memory::{MemoryContent, MemoryEntry, MemoryFilter, MemoryTier, Priority, TierLevel};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, info};

/// The warm memory tier backed by SQLite.
pub struct SqliteTier {
    pool: SqlitePool,
    max_entries: usize,
}

impl SqliteTier {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(url: &str, max_entries: usize) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let in_memory = url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MemoryError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        // Every connection to an in-memory database is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::TierUnavailable(format!("Failed to open SQLite: {e}")))?;

        let tier = Self::from_pool(pool, max_entries).await?;
        info!("SQLite warm tier initialized at {url}");
        Ok(tier)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool, max_entries: usize) -> Result<Self, MemoryError> {
        let tier = Self {
            pool,
            max_entries: max_entries.max(1),
        };
        tier.run_migrations().await?;
        Ok(tier)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_memory (
                id          TEXT PRIMARY KEY NOT NULL,
                mission_id  TEXT NOT NULL,
                agent_id    TEXT NOT NULL,
                session_id  TEXT NOT NULL,
                kind        TEXT NOT NULL,
                content     TEXT NOT NULL,
                priority    INTEGER NOT NULL,
                tags        TEXT NOT NULL DEFAULT '[]',
                created_at  INTEGER NOT NULL,
                expires_at  INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("agent_memory table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_agent_memory_owner ON agent_memory(mission_id, agent_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("owner index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_agent_memory_expiry ON agent_memory(expires_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("expiry index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_context (
                user_id     TEXT NOT NULL,
                mission_id  TEXT NOT NULL,
                context     TEXT NOT NULL,
                updated_at  INTEGER NOT NULL,
                PRIMARY KEY (user_id, mission_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("user_context table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Number of stored rows, expired or not.
    pub async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM agent_memory")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("count: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| MemoryError::QueryFailed(format!("count column: {e}")))?;
        Ok(n.max(0) as usize)
    }

    /// Delete expired rows, then lowest-priority-oldest rows, until the
    /// table is back under `max_entries`.
    async fn enforce_capacity(&self, now: DateTime<Utc>) -> Result<(), MemoryError> {
        let count = self.count().await?;
        if count <= self.max_entries {
            return Ok(());
        }
        let expired = self.delete_expired(now).await?;
        let remaining = count.saturating_sub(expired);
        if remaining <= self.max_entries {
            return Ok(());
        }
        let excess = remaining - self.max_entries;
        let evicted = sqlx::query(
            r#"
            DELETE FROM agent_memory WHERE id IN (
                SELECT id FROM agent_memory
                ORDER BY priority ASC, created_at ASC, id ASC
                LIMIT ?1
            )
            "#,
        )
        .bind(excess as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("eviction failed: {e}")))?
        .rows_affected();
        debug!(evicted, "SQLite tier over capacity, evicted entries");
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, MemoryError> {
        let removed = sqlx::query(
            "DELETE FROM agent_memory WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        )
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("expiry delete failed: {e}")))?
        .rows_affected();
        Ok(removed as usize)
    }

    /// Parse a `MemoryEntry` from a SQLite row.
    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryEntry, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let mission_id: String = row
            .try_get("mission_id")
            .map_err(|e| MemoryError::QueryFailed(format!("mission_id column: {e}")))?;
        let agent_id: String = row
            .try_get("agent_id")
            .map_err(|e| MemoryError::QueryFailed(format!("agent_id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| MemoryError::QueryFailed(format!("session_id column: {e}")))?;
        let content_json: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let priority: i64 = row
            .try_get("priority")
            .map_err(|e| MemoryError::QueryFailed(format!("priority column: {e}")))?;
        let tags_json: String = row
            .try_get("tags")
            .map_err(|e| MemoryError::QueryFailed(format!("tags column: {e}")))?;
        let created_at: i64 = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;
        let expires_at: Option<i64> = row
            .try_get("expires_at")
            .map_err(|e| MemoryError::QueryFailed(format!("expires_at column: {e}")))?;

        let content: MemoryContent = serde_json::from_str(&content_json)
            .map_err(|e| MemoryError::Serialization(format!("entry {id} content: {e}")))?;
        let tags: BTreeSet<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let priority = u8::try_from(priority)
            .ok()
            .and_then(|p| Priority::try_from(p).ok())
            .ok_or_else(|| MemoryError::QueryFailed(format!("entry {id} priority {priority}")))?;

        Ok(MemoryEntry {
            created_at: from_millis(created_at)?,
            expires_at: expires_at.map(from_millis).transpose()?,
            id,
            mission_id,
            agent_id,
            session_id,
            content,
            priority,
            tags,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, MemoryError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| MemoryError::QueryFailed(format!("timestamp out of range: {ms}")))
}

#[async_trait]
impl MemoryTier for SqliteTier {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn level(&self) -> TierLevel {
        TierLevel::Warm
    }

    async fn put(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> Result<(), MemoryError> {
        let content = serde_json::to_string(&entry.content)
            .map_err(|e| MemoryError::Serialization(format!("content: {e}")))?;
        let tags = serde_json::to_string(&entry.tags)
            .map_err(|e| MemoryError::Serialization(format!("tags: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agent_memory
                (id, mission_id, agent_id, session_id, kind, content, priority, tags, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                mission_id = excluded.mission_id,
                agent_id = excluded.agent_id,
                session_id = excluded.session_id,
                kind = excluded.kind,
                content = excluded.content,
                priority = excluded.priority,
                tags = excluded.tags,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.mission_id)
        .bind(&entry.agent_id)
        .bind(&entry.session_id)
        .bind(entry.kind().as_str())
        .bind(&content)
        .bind(u8::from(entry.priority) as i64)
        .bind(&tags)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.expires_at.map(|at| at.timestamp_millis()))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        self.enforce_capacity(now).await
    }

    async fn query(
        &self,
        mission_id: &str,
        filter: &MemoryFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM agent_memory
            WHERE mission_id = ?1
              AND (?2 IS NULL OR agent_id = ?2)
              AND (?3 IS NULL OR session_id = ?3)
              AND (?4 IS NULL OR kind = ?4)
              AND (expires_at IS NULL OR expires_at > ?5)
            ORDER BY priority DESC, created_at DESC, id ASC
            LIMIT ?6
            "#,
        )
        .bind(mission_id)
        .bind(filter.agent_id.as_deref())
        .bind(filter.session_id.as_deref())
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(now.timestamp_millis())
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("query: {e}")))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn put_user_context(
        &self,
        context: &UserContext,
        _ttl: std::time::Duration,
    ) -> Result<(), MemoryError> {
        let json = serde_json::to_string(context)
            .map_err(|e| MemoryError::Serialization(format!("user context: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO user_context (user_id, mission_id, context, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, mission_id) DO UPDATE SET
                context = excluded.context,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&context.user_id)
        .bind(&context.mission_id)
        .bind(&json)
        .bind(context.last_activity.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("user context upsert failed: {e}")))?;
        Ok(())
    }

    async fn get_user_context(
        &self,
        user_id: &str,
        mission_id: &str,
    ) -> Result<Option<UserContext>, MemoryError> {
        let row = sqlx::query("SELECT context FROM user_context WHERE user_id = ?1 AND mission_id = ?2")
            .bind(user_id)
            .bind(mission_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("user context: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row
            .try_get("context")
            .map_err(|e| MemoryError::QueryFailed(format!("context column: {e}")))?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| MemoryError::Serialization(format!("user context: {e}")))
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, MemoryError> {
        self.delete_expired(now).await
    }

    async fn health_check(&self) -> Result<(), MemoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::TierUnavailable(format!("SQLite ping: {e}")))?;
        Ok(())
    }
}
