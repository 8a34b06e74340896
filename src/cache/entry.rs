//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

/// Fixed per-entry bookkeeping charged on top of key and payload bytes.
pub const ENTRY_OVERHEAD_BYTES: usize = 64;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// The payload is immutable once stored; replacing a value swaps the whole
/// entry under the shard write lock, so readers never see a torn value.
#[derive(Debug)]
pub struct CacheEntry {
    /// The key this entry is stored under
    pub key: String,
    /// The stored payload (lz4 block when `compressed`)
    pub value: Bytes,
    /// Whether `value` holds compressed bytes
    pub compressed: bool,
    /// Accounted size: key + stored payload + tags + overhead
    pub size_bytes: usize,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Free-form labels
    pub tags: HashMap<String, String>,
    last_accessed: AtomicU64,
    access_count: AtomicU64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `key` - Key the entry is stored under
    /// * `value` - Stored payload, already compressed if `compressed`
    /// * `ttl_seconds` - Optional TTL in seconds
    /// * `now_ms` - Creation time
    pub fn new(
        key: String,
        value: Bytes,
        compressed: bool,
        ttl_seconds: Option<u64>,
        tags: HashMap<String, String>,
        now_ms: u64,
    ) -> Self {
        let expires_at = ttl_seconds.map(|ttl| now_ms + ttl * 1000);
        let size_bytes = estimate_size(&key, value.len(), &tags);

        Self {
            key,
            value,
            compressed,
            size_bytes,
            created_at: now_ms,
            expires_at,
            tags,
            last_accessed: AtomicU64::new(now_ms),
            access_count: AtomicU64::new(0),
        }
    }

    /// Builds a replacement entry carrying over access history.
    pub fn with_expiry(&self, expires_at: Option<u64>) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            compressed: self.compressed,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            expires_at,
            tags: self.tags.clone(),
            last_accessed: AtomicU64::new(self.last_accessed()),
            access_count: AtomicU64::new(self.access_count()),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(now_ms))
    }

    /// Returns remaining TTL in whole seconds, rounding up so a live entry
    /// never reports zero.
    pub fn ttl_remaining(&self, now_ms: u64) -> Option<u64> {
        self.ttl_remaining_ms(now_ms).map(|ms| ms.div_ceil(1000))
    }

    // == Access Tracking ==
    /// Records a read at `now_ms`. Safe under the shard read lock.
    pub fn touch(&self, now_ms: u64) {
        self.last_accessed.store(now_ms, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_accessed(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }
}

impl Clone for CacheEntry {
    fn clone(&self) -> Self {
        self.with_expiry(self.expires_at)
    }
}

/// Estimates the memory charged for an entry.
pub fn estimate_size(key: &str, payload_len: usize, tags: &HashMap<String, String>) -> usize {
    let tag_bytes: usize = tags.iter().map(|(k, v)| k.len() + v.len()).sum();
    key.len() + payload_len + tag_bytes + ENTRY_OVERHEAD_BYTES
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl: Option<u64>, now: u64) -> CacheEntry {
        CacheEntry::new(
            "k".to_string(),
            Bytes::from_static(b"test_value"),
            false,
            ttl,
            HashMap::new(),
            now,
        )
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = entry(None, 1_000);

        assert_eq!(entry.value.as_ref(), b"test_value");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired(u64::MAX));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = entry(Some(60), 1_000);

        assert_eq!(entry.expires_at, Some(61_000));
        assert!(!entry.is_expired(60_999));
        assert!(entry.is_expired(61_000));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = entry(Some(10), 0);

        assert_eq!(entry.ttl_remaining_ms(1_500), Some(8_500));
        assert_eq!(entry.ttl_remaining(1_500), Some(9));
        assert_eq!(entry.ttl_remaining(20_000), Some(0));
    }

    #[test]
    fn test_ttl_remaining_no_expiration() {
        let entry = entry(None, 0);
        assert!(entry.ttl_remaining(5).is_none());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = entry(Some(0), 500);
        assert!(entry.is_expired(500), "Entry should be expired at boundary");
    }

    #[test]
    fn test_touch_updates_access_stats() {
        let entry = entry(None, 100);
        entry.touch(200);
        entry.touch(300);

        assert_eq!(entry.access_count(), 2);
        assert_eq!(entry.last_accessed(), 300);

        let cloned = entry.clone();
        assert_eq!(cloned.access_count(), 2);
    }

    #[test]
    fn test_size_accounts_for_tags() {
        let mut tags = HashMap::new();
        tags.insert("type".to_string(), "quote".to_string());
        let sized = CacheEntry::new("key".into(), Bytes::from_static(b"abcd"), false, None, tags, 0);
        assert_eq!(sized.size_bytes, 3 + 4 + 9 + ENTRY_OVERHEAD_BYTES);
    }
}
