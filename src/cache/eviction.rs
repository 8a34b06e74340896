//! Eviction & Cleanup Module
//!
//! One cleanup cycle sweeps expired entries, then evicts live entries under
//! the configured policy while the store sits above its memory threshold or
//! entry ceiling.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::EntryStore;
use crate::config::CacheConfiguration;
use crate::error::CacheError;
use crate::events::{EventSeverity, EventType};

// == Eviction Policy ==
/// Order in which live entries are evicted under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed first
    Lru,
    /// Lowest access count first
    Lfu,
    /// Oldest created first
    Fifo,
    /// Uniformly random
    Random,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Random => "random",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "random" => Ok(EvictionPolicy::Random),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

// == Cleanup Report ==
/// Outcome of one cleanup cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CleanupReport {
    pub expired_removed: usize,
    pub evicted: usize,
    /// Memory utilization before the cycle, in [0, 1]
    pub utilization_before: f64,
    pub utilization_after: f64,
    /// Whether the store ended at or below its thresholds
    pub threshold_met: bool,
}

#[derive(Debug)]
struct Candidate {
    key: String,
    created_at: u64,
    last_accessed: u64,
    access_count: u64,
}

// == Cleanup Cycle ==
/// Runs one sweep-then-evict cycle against `store`.
///
/// Eviction stops once the store is back under its thresholds or after
/// `cleanup_percentage` of the entries have been evicted. Every removal
/// happens under the owning shard's write lock.
///
/// A `PerformanceAlert` is emitted whenever the cycle ends above threshold,
/// including when only the per-cycle budget stopped eviction; the event's
/// `budget_exhausted` field tells the two cases apart.
pub fn run_cleanup_cycle(store: &EntryStore) -> CleanupReport {
    let config = store.config();
    let now = store.now_ms();
    let utilization_before = utilization(store, &config);

    let expired_removed = purge_expired(store, now);

    let mut evicted = 0;
    let mut budget_exhausted = false;
    if over_threshold(store, &config) {
        let budget = ((store.len() as f64 * config.limits.cleanup_percentage).ceil() as usize).max(1);
        let candidates = ordered_candidates(store, config.limits.eviction_policy);
        for candidate in candidates {
            if evicted >= budget || !over_threshold(store, &config) {
                break;
            }
            let removed = store.map().write(&candidate.key, |shard| {
                // skip entries rewritten since the candidate list was built
                let unchanged = shard
                    .get(&candidate.key)
                    .is_some_and(|e| e.created_at == candidate.created_at);
                unchanged && shard.remove(&candidate.key).is_some()
            });
            if removed {
                evicted += 1;
            }
        }
        budget_exhausted = evicted >= budget;
    }

    let monitor = store.monitor();
    monitor.record_cleanup(expired_removed as u64);
    monitor.record_evictions(evicted as u64);

    let utilization_after = utilization(store, &config);
    let threshold_met = !over_threshold(store, &config);
    if !threshold_met {
        warn!(
            "Cleanup left cache above threshold: utilization {:.2}, {} entries",
            utilization_after,
            store.len()
        );
        store.events().emit(
            EventType::PerformanceAlert,
            EventSeverity::Warn,
            json!({
                "reason": "memory_pressure",
                "utilization": utilization_after,
                "threshold": config.limits.memory_threshold_ratio,
                "entries": store.len(),
                "evicted": evicted,
                "budget_exhausted": budget_exhausted,
            }),
        );
    }

    if expired_removed > 0 || evicted > 0 {
        info!(
            "Cleanup: removed {} expired, evicted {} ({})",
            expired_removed, evicted, config.limits.eviction_policy
        );
    } else {
        debug!("Cleanup: nothing to remove");
    }

    CleanupReport {
        expired_removed,
        evicted,
        utilization_before,
        utilization_after,
        threshold_met,
    }
}

/// Removes every entry expired at `now`, one shard at a time.
pub fn purge_expired(store: &EntryStore, now: u64) -> usize {
    let mut removed = 0;
    store.map().for_each_shard_mut(|shard| {
        removed += shard.remove_where(|e| e.is_expired(now));
    });
    removed
}

fn utilization(store: &EntryStore, config: &CacheConfiguration) -> f64 {
    let ratio = store.memory_usage() as f64 / config.performance.max_memory_bytes as f64;
    ratio.clamp(0.0, 1.0)
}

fn over_threshold(store: &EntryStore, config: &CacheConfiguration) -> bool {
    let memory_limit = config.performance.max_memory_bytes as f64 * config.limits.memory_threshold_ratio;
    store.memory_usage() as f64 > memory_limit || store.len() > config.limits.max_entry_count
}

fn ordered_candidates(store: &EntryStore, policy: EvictionPolicy) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(store.len());
    store.map().for_each_shard(|shard| {
        candidates.extend(shard.iter().map(|e| Candidate {
            key: e.key.clone(),
            created_at: e.created_at,
            last_accessed: e.last_accessed(),
            access_count: e.access_count(),
        }));
    });

    match policy {
        EvictionPolicy::Lru => {
            candidates.sort_by(|a, b| (a.last_accessed, &a.key).cmp(&(b.last_accessed, &b.key)))
        }
        EvictionPolicy::Lfu => candidates.sort_by(|a, b| {
            (a.access_count, a.last_accessed, &a.key).cmp(&(b.access_count, b.last_accessed, &b.key))
        }),
        EvictionPolicy::Fifo => {
            candidates.sort_by(|a, b| (a.created_at, &a.key).cmp(&(b.created_at, &b.key)))
        }
        EvictionPolicy::Random => candidates.shuffle(&mut rand::thread_rng()),
    }
    candidates
}
