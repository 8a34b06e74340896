//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.
//! Operation option types (`BenchmarkOptions`, `BackupOptions`, ...) are
//! accepted as bodies directly.

use serde::Deserialize;

use crate::cache::{BatchSetItem, SetOptions};
use crate::ops::RestoreOptions;

/// Request body for `PUT /cache/:key`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The value to store, as UTF-8 text
    pub value: String,
    /// TTL, strategy, compression and tags
    #[serde(flatten)]
    pub options: SetOptions,
}

/// Request body for `POST /cache/batch/get` and `/cache/batch/delete`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchKeysRequest {
    pub keys: Vec<String>,
    /// Only used by batch delete
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
}

/// Request body for `POST /cache/batch/set`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSetRequest {
    pub items: Vec<BatchSetItem>,
}

/// Request body for `POST /cache/:key/incr`; a negative delta decrements
#[derive(Debug, Clone, Deserialize)]
pub struct IncrementRequest {
    #[serde(default = "default_delta")]
    pub delta: i64,
}

/// Request body for `POST /cache/clear`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearRequest {
    /// Exact key or `prefix*`; everything when absent
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Query string for `GET /stats`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub time_range_ms: Option<u64>,
}

/// Request body for `POST /restore`
#[derive(Debug, Clone, Deserialize)]
pub struct RestoreRequest {
    /// Base64 payload exactly as returned by `POST /backup`
    pub data: String,
    #[serde(flatten)]
    pub options: RestoreOptions,
}

fn default_true() -> bool {
    true
}

fn default_delta() -> i64 {
    1
}
