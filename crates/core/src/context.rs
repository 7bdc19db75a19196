//! Per-(user, mission) context carried across stateless analysis calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Data Structures ─────────────────────────────────────────────────────

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub action: String,
    #[serde(default)]
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// What the system knows about one user working on one mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub mission_id: String,

    #[serde(default)]
    pub preferences: BTreeMap<String, String>,

    /// Most-recent-last, bounded by the caller's history limit.
    #[serde(default)]
    pub interaction_history: Vec<Interaction>,

    /// Named progress scalars, each in [0, 1].
    #[serde(default)]
    pub learning_progress: BTreeMap<String, f64>,

    pub last_activity: DateTime<Utc>,

    #[serde(default)]
    pub session_count: u32,

    /// Cumulative active time, in seconds.
    #[serde(default)]
    pub total_time_spent_secs: u64,
}

impl UserContext {
    /// A fresh context with no history, counted as the first session.
    pub fn new(user_id: impl Into<String>, mission_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            mission_id: mission_id.into(),
            preferences: BTreeMap::new(),
            interaction_history: Vec::new(),
            learning_progress: BTreeMap::new(),
            last_activity: now,
            session_count: 1,
            total_time_spent_secs: 0,
        }
    }

    /// Append an interaction, dropping the oldest ones beyond `limit`.
    pub fn record_interaction(
        &mut self,
        action: impl Into<String>,
        detail: impl Into<String>,
        now: DateTime<Utc>,
        limit: usize,
    ) {
        self.interaction_history.push(Interaction {
            action: action.into(),
            detail: detail.into(),
            at: now,
        });
        if self.interaction_history.len() > limit {
            let excess = self.interaction_history.len() - limit;
            self.interaction_history.drain(..excess);
        }
    }

    /// Set a progress scalar, clamped to [0, 1]. NaN is stored as 0.
    pub fn set_progress(&mut self, name: impl Into<String>, value: f64) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.learning_progress.insert(name.into(), value);
    }

    pub fn progress(&self, name: &str) -> Option<f64> {
        self.learning_progress.get(name).copied()
    }

    /// Register activity at `now`.
    ///
    /// A gap of at most `session_gap` since the last activity counts as
    /// active time; a longer gap starts a new session instead.
    pub fn touch(&mut self, now: DateTime<Utc>, session_gap: Duration) {
        let gap = now - self.last_activity;
        if gap > session_gap {
            self.session_count = self.session_count.saturating_add(1);
        } else if gap > Duration::zero() {
            self.total_time_spent_secs = self
                .total_time_spent_secs
                .saturating_add(gap.num_seconds().max(0) as u64);
        }
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_most_recent_last() {
        let now = Utc::now();
        let mut ctx = UserContext::new("u1", "m1", now);
        for i in 0..5 {
            ctx.record_interaction("analysis", format!("run {i}"), now, 3);
        }
        assert_eq!(ctx.interaction_history.len(), 3);
        assert_eq!(ctx.interaction_history[0].detail, "run 2");
        assert_eq!(ctx.interaction_history[2].detail, "run 4");
    }

    #[test]
    fn progress_is_clamped() {
        let mut ctx = UserContext::new("u1", "m1", Utc::now());
        ctx.set_progress("completion", 1.7);
        ctx.set_progress("quality", -0.2);
        ctx.set_progress("coherence", f64::NAN);
        assert_eq!(ctx.progress("completion"), Some(1.0));
        assert_eq!(ctx.progress("quality"), Some(0.0));
        assert_eq!(ctx.progress("coherence"), Some(0.0));
        assert_eq!(ctx.progress("missing"), None);
    }

    #[test]
    fn touch_accumulates_time_within_a_session() {
        let start = Utc::now();
        let mut ctx = UserContext::new("u1", "m1", start);
        ctx.touch(start + Duration::minutes(10), Duration::minutes(30));
        assert_eq!(ctx.session_count, 1);
        assert_eq!(ctx.total_time_spent_secs, 600);
    }

    #[test]
    fn long_gap_starts_new_session() {
        let start = Utc::now();
        let mut ctx = UserContext::new("u1", "m1", start);
        ctx.touch(start + Duration::hours(2), Duration::minutes(30));
        assert_eq!(ctx.session_count, 2);
        assert_eq!(ctx.total_time_spent_secs, 0);
        assert_eq!(ctx.last_activity, start + Duration::hours(2));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = serde_json::json!({
            "user_id": "u1",
            "mission_id": "m1",
            "last_activity": "2026-01-01T00:00:00Z"
        });
        let ctx: UserContext = serde_json::from_value(json).unwrap();
        assert!(ctx.interaction_history.is_empty());
        assert_eq!(ctx.session_count, 0);
    }
}
