//! Sharded Map Module
//!
//! Concurrent key→entry map split into independently locked shards.
//!
//! # Design
//!
//! - Each shard has its own RwLock, so unrelated keys never contend
//! - All mutations of a key happen under its shard's write lock
//! - Readers hold the shard read lock for the duration of a read, which keeps
//!   eviction from removing an entry mid-read

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::CacheEntry;

/// Default number of shards; a power of two so the index is a mask.
pub const DEFAULT_SHARD_COUNT: usize = 64;

// == Shard Map ==
/// Entries of a single shard with size accounting.
#[derive(Debug, Default)]
pub struct ShardMap {
    entries: HashMap<String, CacheEntry>,
    size_bytes: usize,
}

impl ShardMap {
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Inserts an entry, returning the previous one.
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.size_bytes += entry.size_bytes;
        let old = self.entries.insert(entry.key.clone(), entry);
        if let Some(old) = &old {
            self.size_bytes -= old.size_bytes;
        }
        old
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if let Some(entry) = &removed {
            self.size_bytes -= entry.size_bytes;
        }
        removed
    }

    /// Removes every entry matching `predicate`, returning how many went.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let before = self.entries.len();
        let mut freed = 0;
        self.entries.retain(|_, entry| {
            let drop = predicate(entry);
            if drop {
                freed += entry.size_bytes;
            }
            !drop
        });
        self.size_bytes -= freed;
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}

// == Sharded Map ==
/// Hash-partitioned collection of [`ShardMap`]s.
///
/// Totals are kept in atomics so no code path ever holds two shard locks.
#[derive(Debug)]
pub struct ShardedMap {
    shards: Vec<RwLock<ShardMap>>,
    mask: usize,
    count: AtomicUsize,
    bytes: AtomicUsize,
}

impl Default for ShardedMap {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}

impl ShardedMap {
    /// Creates a map with `shard_count` rounded up to a power of two.
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards = (0..count).map(|_| RwLock::new(ShardMap::default())).collect();
        Self {
            shards,
            mask: count - 1,
            count: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_for(&self, key: &str) -> &RwLock<ShardMap> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & self.mask]
    }

    /// Runs `f` under the read lock of the shard owning `key`.
    pub fn read<R>(&self, key: &str, f: impl FnOnce(Option<&CacheEntry>) -> R) -> R {
        let guard = self.shard_for(key).read();
        f(guard.get(key))
    }

    /// Runs `f` under the write lock of the shard owning `key`.
    pub fn write<R>(&self, key: &str, f: impl FnOnce(&mut ShardMap) -> R) -> R {
        let mut guard = self.shard_for(key).write();
        self.tracked(&mut guard, f)
    }

    fn tracked<R>(&self, shard: &mut ShardMap, f: impl FnOnce(&mut ShardMap) -> R) -> R {
        let (len, size) = (shard.len(), shard.size_bytes());
        let result = f(shard);
        let (new_len, new_size) = (shard.len(), shard.size_bytes());
        if new_len >= len {
            self.count.fetch_add(new_len - len, Ordering::Relaxed);
        } else {
            self.count.fetch_sub(len - new_len, Ordering::Relaxed);
        }
        if new_size >= size {
            self.bytes.fetch_add(new_size - size, Ordering::Relaxed);
        } else {
            self.bytes.fetch_sub(size - new_size, Ordering::Relaxed);
        }
        result
    }

    /// Visits every shard under its read lock, one shard at a time.
    pub fn for_each_shard(&self, mut f: impl FnMut(&ShardMap)) {
        for shard in &self.shards {
            f(&shard.read());
        }
    }

    /// Visits every shard under its write lock, one shard at a time.
    pub fn for_each_shard_mut(&self, mut f: impl FnMut(&mut ShardMap)) {
        for shard in &self.shards {
            let mut guard = shard.write();
            self.tracked(&mut guard, &mut f);
        }
    }

    /// Total number of physically stored entries, including lazily expired ones.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total accounted bytes across shards.
    pub fn size_bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }
}
