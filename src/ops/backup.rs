//! Backup & Restore
//!
//! Serializes a filtered snapshot of live entries and replays it into a
//! store.
//!
//! # Payload format
//!
//! One marker byte followed by the document: `0` for plain JSON, `1` for an
//! lz4 block holding the JSON. Values are base64 encoded, always in their
//! decompressed form.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{compression, EntryStore, GetOptions, SetOptions};
use crate::error::{CacheError, ErrorInfo, Result};
use crate::retry::RetryPolicy;

const MARKER_PLAIN: u8 = 0;
const MARKER_LZ4: u8 = 1;
const FORMAT_VERSION: u32 = 1;

// == Options ==
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions {
    pub pattern: Option<String>,
    pub compress: bool,
    pub include_metadata: bool,
    /// Overall deadline; defaults to the configured operation timeout
    pub timeout_ms: Option<u64>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            pattern: None,
            compress: true,
            include_metadata: true,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreOptions {
    /// Replace live entries with the same key
    pub overwrite: bool,
    /// Prepended to every restored key
    pub key_prefix: Option<String>,
    /// Read back each restored entry and compare it with the backup
    pub validate: bool,
    /// Abort at the first failed entry
    pub stop_on_error: bool,
    /// Overall deadline; defaults to the configured operation timeout
    pub timeout_ms: Option<u64>,
}

// == Document ==
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupEntry {
    key: String,
    value: String,
    compressed: bool,
    ttl_remaining_ms: Option<u64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub source_module: String,
    pub pattern: Option<String>,
    pub entry_count: usize,
    pub total_value_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupDocument {
    version: u32,
    id: String,
    created_at: DateTime<Utc>,
    entries: Vec<BackupEntry>,
    metadata: Option<BackupMetadata>,
}

// == Results ==
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResult {
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
    pub key_count: usize,
    /// Size of the uncompressed payload
    pub raw_size_bytes: usize,
    /// Size of `data`; never above `raw_size_bytes`
    pub stored_size_bytes: usize,
    pub compressed: bool,
    pub duration_ms: u64,
    pub metadata: Option<BackupMetadata>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreFailure {
    pub key: String,
    pub error: ErrorInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    pub backup_id: String,
    /// Always `restored + skipped + failed`
    pub total_keys_processed: usize,
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<RestoreFailure>,
    /// Entries left unprocessed after an abort, cancellation or timeout
    pub partial: bool,
    pub duration_ms: u64,
}

// == Create Backup ==
/// Serializes every live entry matching `options.pattern`.
///
/// A backup is all or nothing: hitting the deadline fails with
/// `OperationTimeout` instead of returning a truncated snapshot.
pub fn create_backup(store: &EntryStore, options: &BackupOptions, cancel: &CancellationToken) -> Result<BackupResult> {
    let started = Instant::now();
    let now = store.now_ms();
    let timeout_ms = options
        .timeout_ms
        .unwrap_or(store.config().performance.operation_timeout_ms);
    let deadline = started + Duration::from_millis(timeout_ms);

    let mut entries = Vec::new();
    let mut total_value_bytes = 0;
    for entry in store.snapshot(options.pattern.as_deref()) {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled("backup cancelled".into()));
        }
        if Instant::now() >= deadline {
            warn!("Backup stopped after {} entries: deadline of {} ms passed", entries.len(), timeout_ms);
            return Err(CacheError::OperationTimeout(timeout_ms));
        }
        let value = compression::expand(&entry.value, entry.compressed)?;
        total_value_bytes += value.len();
        entries.push(BackupEntry {
            ttl_remaining_ms: entry.ttl_remaining_ms(now),
            key: entry.key,
            value: BASE64.encode(&value),
            compressed: entry.compressed,
            tags: entry.tags,
        });
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    let metadata = options.include_metadata.then(|| BackupMetadata {
        source_module: store.events().source().to_string(),
        pattern: options.pattern.clone(),
        entry_count: entries.len(),
        total_value_bytes,
    });
    let document = BackupDocument {
        version: FORMAT_VERSION,
        id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        entries,
        metadata,
    };
    let json = serde_json::to_vec(&document).map_err(|e| CacheError::Serialization(e.to_string()))?;
    let raw_size_bytes = json.len() + 1;

    let mut data = Vec::with_capacity(raw_size_bytes);
    let mut compressed = false;
    if options.compress {
        let packed = compression::compress(&json)?;
        if packed.len() < json.len() {
            data.push(MARKER_LZ4);
            data.extend_from_slice(&packed);
            compressed = true;
        }
    }
    if !compressed {
        data.push(MARKER_PLAIN);
        data.extend_from_slice(&json);
    }

    info!(
        "Backup {} created: {} keys, {} -> {} bytes",
        document.id,
        document.entries.len(),
        raw_size_bytes,
        data.len()
    );
    Ok(BackupResult {
        backup_id: document.id,
        created_at: document.created_at,
        key_count: document.entries.len(),
        raw_size_bytes,
        stored_size_bytes: data.len(),
        compressed,
        duration_ms: started.elapsed().as_millis() as u64,
        metadata: document.metadata,
        data,
    })
}

fn decode_document(data: &[u8]) -> Result<BackupDocument> {
    let (marker, body) = data
        .split_first()
        .ok_or_else(|| CacheError::Serialization("empty backup payload".into()))?;
    let json = match *marker {
        MARKER_PLAIN => body.to_vec(),
        MARKER_LZ4 => compression::decompress(body)?,
        other => {
            return Err(CacheError::Serialization(format!(
                "unknown backup marker {}",
                other
            )))
        }
    };
    let document: BackupDocument =
        serde_json::from_slice(&json).map_err(|e| CacheError::Serialization(e.to_string()))?;
    if document.version != FORMAT_VERSION {
        return Err(CacheError::Serialization(format!(
            "unsupported backup version {}",
            document.version
        )));
    }
    Ok(document)
}

// == Restore ==
enum Outcome {
    Restored,
    Skipped,
}

/// Replays a backup produced by [`create_backup`].
///
/// Writes go through `retry`. A bad entry is counted as failed and the
/// restore continues unless `stop_on_error` is set. Cancellation and the
/// deadline stop the replay and flag the result `partial`.
pub async fn restore_from_backup(
    store: &EntryStore,
    data: &[u8],
    options: &RestoreOptions,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RestoreResult> {
    let started = Instant::now();
    let timeout_ms = options
        .timeout_ms
        .unwrap_or(store.config().performance.operation_timeout_ms);
    let deadline = started + Duration::from_millis(timeout_ms);
    let document = decode_document(data)?;
    let mut result = RestoreResult {
        backup_id: document.id.clone(),
        ..RestoreResult::default()
    };

    for entry in &document.entries {
        if cancel.is_cancelled() {
            result.partial = true;
            break;
        }
        if Instant::now() >= deadline {
            warn!("Restore of {} stopped: deadline of {} ms passed", result.backup_id, timeout_ms);
            result.partial = true;
            break;
        }
        let key = match &options.key_prefix {
            Some(prefix) => format!("{}{}", prefix, entry.key),
            None => entry.key.clone(),
        };
        match restore_entry(store, &key, entry, options, retry).await {
            Ok(Outcome::Restored) => result.restored += 1,
            Ok(Outcome::Skipped) => result.skipped += 1,
            Err(e) => {
                warn!("restore of '{}' failed: {}", key, e);
                result.failed += 1;
                result.failures.push(RestoreFailure {
                    key,
                    error: ErrorInfo::from(&e),
                });
                if options.stop_on_error {
                    result.partial = true;
                    break;
                }
            }
        }
    }

    result.total_keys_processed = result.restored + result.skipped + result.failed;
    result.partial |= result.total_keys_processed < document.entries.len();
    result.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Restore of {}: {} restored, {} skipped, {} failed",
        result.backup_id, result.restored, result.skipped, result.failed
    );
    Ok(result)
}

async fn restore_entry(
    store: &EntryStore,
    key: &str,
    entry: &BackupEntry,
    options: &RestoreOptions,
    retry: &RetryPolicy,
) -> Result<Outcome> {
    let value = Bytes::from(
        BASE64
            .decode(&entry.value)
            .map_err(|e| CacheError::Serialization(format!("bad base64 for '{}': {}", entry.key, e)))?,
    );
    let ttl = match entry.ttl_remaining_ms {
        Some(0) => return Ok(Outcome::Skipped),
        Some(ms) => Some(ms.div_ceil(1000)),
        None => None,
    };
    let set_options = SetOptions {
        ttl,
        strategy: None,
        compress: entry.compressed,
        tags: entry.tags.clone(),
    };

    let written = retry
        .run(|| {
            let value = value.clone();
            let set_options = set_options.clone();
            async move {
                if options.overwrite {
                    store.set(key, value, set_options).map(|_| true)
                } else {
                    store.set_if_not_exists(key, value, set_options)
                }
            }
        })
        .await?;
    if !written {
        return Ok(Outcome::Skipped);
    }

    if options.validate {
        let read = store.get(key, GetOptions { peek: true })?;
        if read.data.as_ref() != Some(&value) {
            return Err(CacheError::Serialization(format!(
                "restored value for '{}' does not match backup",
                key
            )));
        }
    }
    Ok(Outcome::Restored)
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}
