//! Entry Store Module
//!
//! The public cache contract: single-key operations, counters, batches and
//! `get_or_set`, on top of the sharded map with lazy TTL expiry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::compression;
use super::shard::{ShardMap, ShardedMap};
use super::stats::{OpKind, OpOutcome, StatsMonitor, StoreUsage};
use super::ttl::{clamp_ttl, select_ttl, MarketSessionProvider, TtlContext, TtlStrategy};
use super::{CacheEntry, Clock, SystemClock};
use crate::config::{CacheConfiguration, ConfigHandle};
use crate::error::{CacheError, ErrorInfo, Result};
use crate::events::EventBus;

// == Options & Results ==
/// Options for `get`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GetOptions {
    /// Read without updating access statistics
    #[serde(default)]
    pub peek: bool,
}

/// Options for `set`-like operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetOptions {
    /// Explicit TTL in seconds; wins over `strategy`
    #[serde(default)]
    pub ttl: Option<u64>,
    /// TTL classification used when no explicit TTL is given
    #[serde(default)]
    pub strategy: Option<TtlStrategy>,
    /// Compress payloads at or above the compression threshold
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl SetOptions {
    pub fn with_ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn with_strategy(strategy: TtlStrategy) -> Self {
        Self {
            strategy: Some(strategy),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetResult {
    pub hit: bool,
    pub data: Option<Bytes>,
    /// Remaining TTL in seconds
    pub remaining_ttl: Option<u64>,
}

impl GetResult {
    fn miss() -> Self {
        Self {
            hit: false,
            data: None,
            remaining_ttl: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetResult {
    /// A live entry with the same key was overwritten
    pub replaced: bool,
    /// TTL applied, in seconds
    pub ttl: u64,
}

/// Outcome of `get_or_set`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetOrSetResult {
    pub hit: bool,
    pub data: Bytes,
}

/// One item of a `batch_set`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSetItem {
    pub key: String,
    #[serde(with = "bytes_as_string")]
    pub value: Bytes,
    #[serde(default)]
    pub options: SetOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult<T> {
    pub key: String,
    pub success: bool,
    pub value: Option<T>,
    pub error: Option<ErrorInfo>,
}

/// Positionally aligned batch results.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult<T> {
    pub results: Vec<BatchItemResult<T>>,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_count: usize,
}

impl<T> BatchResult<T> {
    fn collect(results: Vec<BatchItemResult<T>>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let total_count = results.len();
        Self {
            results,
            success_count,
            failure_count: total_count - success_count,
            total_count,
        }
    }

    /// Converts every successful value, keeping positions and counts.
    pub fn map_values<U>(self, mut f: impl FnMut(&str, T) -> U) -> BatchResult<U> {
        let results = self
            .results
            .into_iter()
            .map(|r| BatchItemResult {
                value: r.value.map(|v| f(&r.key, v)),
                key: r.key,
                success: r.success,
                error: r.error,
            })
            .collect();
        BatchResult {
            results,
            success_count: self.success_count,
            failure_count: self.failure_count,
            total_count: self.total_count,
        }
    }
}

fn item<T>(key: &str, result: Result<T>) -> BatchItemResult<T> {
    match result {
        Ok(value) => BatchItemResult {
            key: key.to_string(),
            success: true,
            value: Some(value),
            error: None,
        },
        Err(e) => BatchItemResult {
            key: key.to_string(),
            success: false,
            value: None,
            error: Some(ErrorInfo::from(&e)),
        },
    }
}

/// Reserved namespace for synthetic load. Operations on these keys are
/// reported to [`EntryStore::synthetic_monitor`], never to the main monitor.
pub const SYNTHETIC_PREFIX: &str = "__bench__:";

// == Entry Store ==
/// Thread-safe cache store shared by every caller of a module.
pub struct EntryStore {
    map: ShardedMap,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
    monitor: Arc<StatsMonitor>,
    synthetic: Arc<StatsMonitor>,
    events: EventBus,
    sessions: Option<Arc<dyn MarketSessionProvider>>,
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("entries", &self.map.len())
            .field("memory_bytes", &self.map.size_bytes())
            .field("source", &self.events.source())
            .finish()
    }
}

impl EntryStore {
    // == Constructor ==
    /// Creates a store on the system clock with no event consumer.
    pub fn new(config: ConfigHandle) -> Self {
        Self::with_parts(config, Arc::new(SystemClock), EventBus::disconnected("cache"))
    }

    /// Creates a store from explicit collaborators.
    pub fn with_parts(config: ConfigHandle, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        let slow = Duration::from_millis(config.load().performance.slow_operation_threshold_ms);
        Self {
            map: ShardedMap::default(),
            monitor: Arc::new(StatsMonitor::new(clock.clone(), slow)),
            synthetic: Arc::new(StatsMonitor::new(clock.clone(), slow)),
            config,
            clock,
            events,
            sessions: None,
        }
    }

    /// Attaches the provider consulted by the MARKET_AWARE strategy.
    pub fn with_session_provider(mut self, provider: Arc<dyn MarketSessionProvider>) -> Self {
        self.sessions = Some(provider);
        self
    }

    // == Accessors ==
    pub fn monitor(&self) -> &Arc<StatsMonitor> {
        &self.monitor
    }

    /// Figures for operations on keys under [`SYNTHETIC_PREFIX`].
    pub fn synthetic_monitor(&self) -> &Arc<StatsMonitor> {
        &self.synthetic
    }

    pub fn config(&self) -> Arc<CacheConfiguration> {
        self.config.load()
    }

    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub(crate) fn map(&self) -> &ShardedMap {
        &self.map
    }

    /// Physically stored entries, including lazily expired ones.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.map.size_bytes()
    }

    // == Get ==
    /// Retrieves a value by key. A missing or expired key is a miss, not an error.
    pub fn get(&self, key: &str, opts: GetOptions) -> Result<GetResult> {
        self.timed(OpKind::Get, key, |store, config| {
            validate_key(key, config)?;
            let now = store.now_ms();
            let found = store.map.read(key, |entry| match entry {
                Some(entry) if !entry.is_expired(now) => {
                    if !opts.peek {
                        entry.touch(now);
                    }
                    Lookup::Live(entry.value.clone(), entry.compressed, entry.ttl_remaining(now))
                }
                Some(_) => Lookup::Expired,
                None => Lookup::Absent,
            });

            match found {
                Lookup::Live(stored, compressed, remaining_ttl) => {
                    let data = compression::expand(&stored, compressed)?;
                    Ok((
                        GetResult {
                            hit: true,
                            data: Some(data),
                            remaining_ttl,
                        },
                        OpOutcome::Hit,
                    ))
                }
                Lookup::Expired => {
                    store.purge_if_expired(key, now);
                    Ok((GetResult::miss(), OpOutcome::Miss))
                }
                Lookup::Absent => Ok((GetResult::miss(), OpOutcome::Miss)),
            }
        })
    }

    // == Set ==
    /// Stores a value, overwriting any existing entry and resetting its TTL.
    pub fn set(&self, key: &str, value: impl Into<Bytes>, opts: SetOptions) -> Result<SetResult> {
        let value = value.into();
        self.timed(OpKind::Set, key, |store, config| {
            let prepared = store.prepare(key, value, &opts, config)?;
            let now = store.now_ms();
            let ttl = prepared.ttl;
            let replaced = store.map.write(key, |shard| {
                let replaced = is_live(shard, key, now);
                store.check_capacity(shard, key, now, prepared.size, config)?;
                shard.insert(prepared.into_entry(key, now));
                Ok::<_, CacheError>(replaced)
            })?;
            Ok((SetResult { replaced, ttl }, OpOutcome::Ok))
        })
    }

    // == Set If Not Exists ==
    /// Stores the value only when no live entry exists. Returns whether it was stored.
    pub fn set_if_not_exists(&self, key: &str, value: impl Into<Bytes>, opts: SetOptions) -> Result<bool> {
        let value = value.into();
        self.timed(OpKind::SetIfNotExists, key, |store, config| {
            let prepared = store.prepare(key, value, &opts, config)?;
            let now = store.now_ms();
            let stored = store.map.write(key, |shard| {
                if is_live(shard, key, now) {
                    return Ok(false);
                }
                store.check_capacity(shard, key, now, prepared.size, config)?;
                shard.insert(prepared.into_entry(key, now));
                Ok::<_, CacheError>(true)
            })?;
            Ok((stored, OpOutcome::Ok))
        })
    }

    // == Get Or Set ==
    /// Returns the cached value, or computes it with `factory` on a miss.
    ///
    /// The factory runs at most once per call. Concurrent callers missing the
    /// same key may each run their own factory. Factory errors are returned
    /// unchanged and nothing is cached.
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, factory: F, opts: SetOptions) -> std::result::Result<GetOrSetResult, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Bytes, E>>,
        E: From<CacheError>,
    {
        let cached = self.get(key, GetOptions::default())?;
        if let (true, Some(data)) = (cached.hit, cached.data) {
            return Ok(GetOrSetResult { hit: true, data });
        }

        let data = factory().await?;
        self.set(key, data.clone(), opts)?;
        Ok(GetOrSetResult { hit: false, data })
    }

    // == Delete ==
    /// Removes a key. Returns 1 if a live entry was removed, 0 otherwise.
    pub fn delete(&self, key: &str) -> Result<u64> {
        self.timed(OpKind::Delete, key, |store, config| {
            validate_key(key, config)?;
            let now = store.now_ms();
            let removed = store.map.write(key, |shard| shard.remove(key));
            let count = match removed {
                Some(entry) if !entry.is_expired(now) => 1,
                _ => 0,
            };
            Ok((count, OpOutcome::Ok))
        })
    }

    // == Exists ==
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.timed(OpKind::Exists, key, |store, config| {
            validate_key(key, config)?;
            let now = store.now_ms();
            let live = store
                .map
                .read(key, |entry| entry.is_some_and(|e| !e.is_expired(now)));
            Ok((live, OpOutcome::Ok))
        })
    }

    // == TTL ==
    /// Remaining TTL in seconds, or None when the key is absent.
    pub fn ttl(&self, key: &str) -> Result<Option<u64>> {
        self.timed(OpKind::Ttl, key, |store, config| {
            validate_key(key, config)?;
            let now = store.now_ms();
            let remaining = store.map.read(key, |entry| match entry {
                Some(e) if !e.is_expired(now) => e.ttl_remaining(now),
                _ => None,
            });
            Ok((remaining, OpOutcome::Ok))
        })
    }

    // == Expire ==
    /// Resets the TTL of a live key. Returns false when the key is absent.
    pub fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        self.timed(OpKind::Expire, key, |store, config| {
            validate_key(key, config)?;
            let now = store.now_ms();
            let ttl = clamp_ttl(ttl_seconds, &config.ttl);
            let updated = store.map.write(key, |shard| {
                let replacement = match shard.get(key) {
                    Some(e) if !e.is_expired(now) => e.with_expiry(Some(now + ttl * 1000)),
                    _ => return false,
                };
                shard.insert(replacement);
                true
            });
            Ok((updated, OpOutcome::Ok))
        })
    }

    // == Clear ==
    /// Removes every key matching `pattern` (exact or `prefix*`), or every key
    /// when no pattern is given. Returns how many live entries were removed;
    /// expired ones are dropped without being counted, as in [`Self::delete`].
    pub fn clear(&self, pattern: Option<&str>) -> Result<usize> {
        let pattern = pattern.map(KeyPattern::parse).unwrap_or(KeyPattern::All);
        let key_hint = match &pattern {
            KeyPattern::Exact(key) | KeyPattern::Prefix(key) => key.clone(),
            KeyPattern::All => String::new(),
        };
        self.timed(OpKind::Clear, &key_hint, |store, _| {
            let now = store.now_ms();
            let removed = match &pattern {
                KeyPattern::Exact(key) => match store.map.write(key, |shard| shard.remove(key)) {
                    Some(entry) if !entry.is_expired(now) => 1,
                    _ => 0,
                },
                _ => {
                    let mut live = 0;
                    store.map.for_each_shard_mut(|shard| {
                        shard.remove_where(|e| {
                            let hit = pattern.matches(&e.key);
                            if hit && !e.is_expired(now) {
                                live += 1;
                            }
                            hit
                        });
                    });
                    live
                }
            };
            Ok((removed, OpOutcome::Ok))
        })
    }

    // == Increment / Decrement ==
    /// Adds `delta` to an integer value, creating it at 0 when absent.
    ///
    /// Fails with `TypeMismatch` if the stored value is not an integer or the
    /// result would overflow.
    pub fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.timed(OpKind::Increment, key, |store, config| {
            validate_key(key, config)?;
            let now = store.now_ms();
            let default_ttl = store.resolve_ttl(&SetOptions::default(), config);
            let value = store.map.write(key, |shard| {
                let (current, expires_at, tags) = match shard.get(key) {
                    Some(e) if !e.is_expired(now) => {
                        let raw = compression::expand(&e.value, e.compressed)?;
                        (parse_counter(key, &raw)?, e.expires_at, e.tags.clone())
                    }
                    _ => (0, Some(now + default_ttl * 1000), HashMap::new()),
                };
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::TypeMismatch(key.to_string()))?;
                let mut entry = CacheEntry::new(
                    key.to_string(),
                    Bytes::from(next.to_string()),
                    false,
                    None,
                    tags,
                    now,
                );
                entry.expires_at = expires_at;
                shard.insert(entry);
                Ok::<_, CacheError>(next)
            })?;
            Ok((value, OpOutcome::Ok))
        })
    }

    pub fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let negated = delta
            .checked_neg()
            .ok_or_else(|| CacheError::TypeMismatch(key.to_string()))?;
        self.increment(key, negated)
    }

    // == Batch Operations ==
    /// Reads every key independently.
    pub fn batch_get(&self, keys: &[String]) -> BatchResult<GetResult> {
        let results = keys
            .iter()
            .map(|key| item(key, self.get(key, GetOptions::default())))
            .collect();
        BatchResult::collect(results)
    }

    /// Writes every item independently.
    pub fn batch_set(&self, items: Vec<BatchSetItem>) -> BatchResult<SetResult> {
        let results = items
            .into_iter()
            .map(|it| {
                let result = self.set(&it.key, it.value, it.options);
                item(&it.key, result)
            })
            .collect();
        BatchResult::collect(results)
    }

    /// Deletes every key independently.
    ///
    /// With `continue_on_error = false` the batch stops at the first failure;
    /// the remaining keys are reported as not attempted.
    pub fn batch_delete(&self, keys: &[String], continue_on_error: bool) -> BatchResult<u64> {
        let mut results = Vec::with_capacity(keys.len());
        let mut halted = false;
        for key in keys {
            if halted {
                results.push(item(
                    key,
                    Err(CacheError::Cancelled("batch halted by earlier failure".into())),
                ));
                continue;
            }
            let result = self.delete(key);
            if result.is_err() && !continue_on_error {
                halted = true;
            }
            results.push(item(key, result));
        }
        BatchResult::collect(results)
    }

    // == Keys ==
    /// Lists live keys matching `pattern`.
    pub fn keys(&self, pattern: Option<&str>) -> Vec<String> {
        let pattern = pattern.map(KeyPattern::parse).unwrap_or(KeyPattern::All);
        let now = self.now_ms();
        let mut keys = Vec::new();
        self.map.for_each_shard(|shard| {
            keys.extend(
                shard
                    .iter()
                    .filter(|e| !e.is_expired(now) && pattern.matches(&e.key))
                    .map(|e| e.key.clone()),
            );
        });
        keys
    }

    /// Clones live entries matching `pattern`.
    pub fn snapshot(&self, pattern: Option<&str>) -> Vec<CacheEntry> {
        let pattern = pattern.map(KeyPattern::parse).unwrap_or(KeyPattern::All);
        let now = self.now_ms();
        let mut entries = Vec::new();
        self.map.for_each_shard(|shard| {
            entries.extend(
                shard
                    .iter()
                    .filter(|e| !e.is_expired(now) && pattern.matches(&e.key))
                    .cloned(),
            );
        });
        entries
    }

    // == Usage ==
    /// Scans the shards for live and total usage figures.
    pub fn usage(&self) -> StoreUsage {
        let config = self.config();
        let now = self.now_ms();
        let mut live_keys = 0;
        let mut live_bytes = 0;
        self.map.for_each_shard(|shard| {
            for entry in shard.iter().filter(|e| !e.is_expired(now)) {
                live_keys += 1;
                live_bytes += entry.size_bytes;
            }
        });
        StoreUsage {
            key_count: self.map.len(),
            live_key_count: live_keys,
            memory_bytes: self.map.size_bytes(),
            live_memory_bytes: live_bytes,
            max_keys: config.limits.max_entry_count,
            max_memory_bytes: config.performance.max_memory_bytes,
        }
    }

    // == Internals ==
    /// Runs `op` under one configuration snapshot and reports it to the monitor.
    fn timed<T>(
        &self,
        kind: OpKind,
        key: &str,
        op: impl FnOnce(&Self, &CacheConfiguration) -> Result<(T, OpOutcome)>,
    ) -> Result<T> {
        let config = self.config.load();
        let monitor = if key.starts_with(SYNTHETIC_PREFIX) {
            &self.synthetic
        } else {
            &self.monitor
        };
        let started = Instant::now();
        match op(self, &config) {
            Ok((value, outcome)) => {
                monitor.record(started.elapsed(), outcome);
                Ok(value)
            }
            Err(e) => {
                let key = (!key.is_empty()).then_some(key);
                monitor.record_error(kind, started.elapsed(), &e, key);
                Err(e)
            }
        }
    }

    fn resolve_ttl(&self, opts: &SetOptions, config: &CacheConfiguration) -> u64 {
        if let Some(ttl) = opts.ttl {
            return clamp_ttl(ttl, &config.ttl);
        }
        let strategy = opts.strategy.unwrap_or(TtlStrategy::Default);
        let context = TtlContext {
            market_phase: self.sessions.as_ref().map(|s| s.current_phase()),
            hit_rate: (self.monitor.total_operations() > 0).then(|| self.monitor.hit_rate()),
        };
        select_ttl(strategy, &context, &config.ttl)
    }

    fn prepare(&self, key: &str, value: Bytes, opts: &SetOptions, config: &CacheConfiguration) -> Result<Prepared> {
        validate_key(key, config)?;
        if value.len() > config.limits.max_value_bytes {
            return Err(CacheError::ValueTooLarge {
                size: value.len(),
                limit: config.limits.max_value_bytes,
            });
        }
        let (payload, compressed) = if opts.compress {
            compression::maybe_compress(value, config.performance.compression_threshold_bytes)?
        } else {
            (value, false)
        };
        let size = super::entry::estimate_size(key, payload.len(), &opts.tags);
        Ok(Prepared {
            payload,
            compressed,
            ttl: self.resolve_ttl(opts, config),
            tags: opts.tags.clone(),
            size,
        })
    }

    /// Rejects a write that would break the entry-count or memory ceiling,
    /// reclaiming expired entries of the shard first.
    fn check_capacity(
        &self,
        shard: &mut ShardMap,
        key: &str,
        now: u64,
        incoming: usize,
        config: &CacheConfiguration,
    ) -> Result<()> {
        let max_entries = config.limits.max_entry_count;
        let max_memory = config.performance.max_memory_bytes;
        let is_new = shard.get(key).is_none();
        let existing = shard.get(key).map_or(0, |e| e.size_bytes);
        let fits = |count: usize, bytes: usize| {
            let count_ok = !is_new || count < max_entries;
            let projected = (bytes + incoming).saturating_sub(existing);
            count_ok && projected as u64 <= max_memory
        };
        if fits(self.map.len(), self.map.size_bytes()) {
            return Ok(());
        }

        // store-wide totals only catch up once the shard lock is released
        let bytes_before = shard.size_bytes();
        let reclaimed = shard.remove_where(|e| e.key != key && e.is_expired(now));
        let freed = bytes_before - shard.size_bytes();
        let count = self.map.len().saturating_sub(reclaimed);
        let bytes = self.map.size_bytes().saturating_sub(freed);
        if is_new && count >= max_entries {
            return Err(CacheError::CapacityExceeded(format!(
                "entry limit of {} reached",
                max_entries
            )));
        }
        if !fits(count, bytes) {
            return Err(CacheError::CapacityExceeded(format!(
                "memory limit of {} bytes reached",
                max_memory
            )));
        }
        Ok(())
    }

    fn purge_if_expired(&self, key: &str, now: u64) {
        self.map.write(key, |shard| {
            if shard.get(key).is_some_and(|e| e.is_expired(now)) {
                shard.remove(key);
            }
        });
    }
}

enum Lookup {
    Live(Bytes, bool, Option<u64>),
    Expired,
    Absent,
}

struct Prepared {
    payload: Bytes,
    compressed: bool,
    ttl: u64,
    tags: HashMap<String, String>,
    size: usize,
}

impl Prepared {
    fn into_entry(self, key: &str, now: u64) -> CacheEntry {
        CacheEntry::new(
            key.to_string(),
            self.payload,
            self.compressed,
            Some(self.ttl),
            self.tags,
            now,
        )
    }
}

fn is_live(shard: &ShardMap, key: &str, now: u64) -> bool {
    shard.get(key).is_some_and(|e| !e.is_expired(now))
}

/// Rejects empty keys and keys longer than the configured maximum.
pub fn validate_key(key: &str, config: &CacheConfiguration) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > config.limits.max_key_length {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            config.limits.max_key_length
        )));
    }
    Ok(())
}

// == Key Pattern ==
/// Key filter: `*` for everything, `prefix*` for a prefix, otherwise exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    All,
    Prefix(String),
    Exact(String),
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some("") => KeyPattern::All,
            Some(prefix) => KeyPattern::Prefix(prefix.to_string()),
            None => KeyPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Exact(exact) => key == exact,
        }
    }
}

fn parse_counter(key: &str, raw: &[u8]) -> Result<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| CacheError::TypeMismatch(key.to_string()))
}

/// Serde adapter carrying byte payloads as UTF-8 strings.
pub mod bytes_as_string {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        String::deserialize(deserializer).map(Bytes::from)
    }
}
