//! Cache Module
//!
//! Provides the sharded in-memory entry store with TTL strategies,
//! policy-driven eviction and operation statistics.

mod clock;
pub mod compression;
mod entry;
mod eviction;
mod shard;
mod stats;
mod store;
mod ttl;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::{estimate_size, CacheEntry, ENTRY_OVERHEAD_BYTES};
pub use eviction::{purge_expired, run_cleanup_cycle, CleanupReport, EvictionPolicy};
pub use shard::{ShardMap, ShardedMap, DEFAULT_SHARD_COUNT};
pub use stats::{
    percentile, CacheStats, CapacityInfo, ErrorRecord, ErrorStatistics, HealthReport,
    HealthStatus, OpKind, OpOutcome, PerformanceMetrics, StatsMonitor, StoreUsage, TrendPoint,
};
pub use store::{
    bytes_as_string, validate_key, BatchItemResult, BatchResult, BatchSetItem, EntryStore,
    GetOptions, GetOrSetResult, GetResult, KeyPattern, SetOptions, SetResult, SYNTHETIC_PREFIX,
};
pub use ttl::{
    clamp_ttl, select_ttl, FixedSessionProvider, MarketPhase, MarketSessionProvider, TtlContext,
    TtlStrategy,
};
