//! Response DTOs for the admin API
//!
//! Every successful body is wrapped in [`OperationResult`]; failures are
//! rendered by `CacheError`'s `IntoResponse` with the same envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{GetResult, SetResult};

/// Envelope shared by all endpoints: `{success, data, timestamp}`
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Response body for `GET /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub hit: bool,
    /// The stored value as UTF-8 text (lossy for binary payloads)
    pub value: Option<String>,
    /// Remaining TTL in seconds
    pub remaining_ttl: Option<u64>,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, result: GetResult) -> Self {
        Self {
            key: key.into(),
            hit: result.hit,
            value: result
                .data
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            remaining_ttl: result.remaining_ttl,
        }
    }
}

/// Response body for `PUT /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub key: String,
    pub replaced: bool,
    /// TTL applied, in seconds
    pub ttl: u64,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, result: SetResult) -> Self {
        Self {
            key: key.into(),
            replaced: result.replaced,
            ttl: result.ttl,
        }
    }
}

/// Response body for `DELETE /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    /// Number of entries removed (0 or 1)
    pub deleted: u64,
}

/// Response body for `POST /cache/:key/incr`
#[derive(Debug, Clone, Serialize)]
pub struct IncrementResponse {
    pub key: String,
    pub value: i64,
}

/// Response body for `POST /cache/clear`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}
