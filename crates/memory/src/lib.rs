//! Tiered memory store for Atelier.
//!
//! - [`RedisTier`]: hot, volatile, self-expiring (feature `redis`)
//! - [`SqliteTier`]: warm, durable (feature `sqlite`)
//! - [`InProcessTier`]: cold, in-process, always available
//! - [`DisabledTier`]: placeholder for an unconfigured or unreachable tier
//!
//! [`TieredMemoryStore`] fans writes out across all three and reads from
//! the fastest tier that has live data.

pub mod disabled;
pub mod in_memory;
pub mod sweeper;
pub mod tiered;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis_tier;

pub use disabled::DisabledTier;
pub use in_memory::InProcessTier;
pub use sweeper::SweeperHandle;
pub use tiered::{SweepReport, TierStatus, TieredMemoryStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTier;

#[cfg(feature = "redis")]
pub use redis_tier::{RedisKeys, RedisTier};
