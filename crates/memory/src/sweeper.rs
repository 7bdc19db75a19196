//! Background expiry sweeping.

use crate::tiered::TieredMemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running sweeper. Dropping it stops the task.
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TieredMemoryStore {
    /// Run [`sweep`](Self::sweep) every `interval` (at least one second)
    /// until the handle is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let interval = interval.max(MIN_INTERVAL);
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = store.sweep().await;
                debug!(warm = report.warm, cold = report.cold, "Periodic sweep finished");
            }
        });
        info!(interval_secs = interval.as_secs(), "Memory sweeper started");
        SweeperHandle { task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InProcessTier;
    use atelier_core::clock::{Clock, ManualClock};
    use atelier_core::memory::{MemoryContent, MemoryEntry, MemoryTier};

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_entries_periodically() {
        let clock = ManualClock::default();
        let cold = InProcessTier::default();
        let now = clock.now();
        let entry = MemoryEntry::new(
            "m1",
            "a1",
            "s1",
            MemoryContent::Interaction {
                action: "open".into(),
                detail: String::new(),
            },
            now,
        )
        .with_ttl(chrono::Duration::seconds(30));
        cold.put(&entry, now).await.unwrap();

        let store = Arc::new(
            TieredMemoryStore::new(cold).with_clock(Arc::new(clock.clone())),
        );
        let handle = store.spawn_sweeper(Duration::from_secs(60));

        clock.advance(chrono::Duration::minutes(1));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.sweep().await.total(), 0);
        assert!(!handle.is_finished());
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_the_minimum() {
        let store = Arc::new(TieredMemoryStore::new(InProcessTier::default()));
        let handle = store.spawn_sweeper(Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!handle.is_finished());
    }
}
