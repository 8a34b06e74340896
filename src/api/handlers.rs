//! API Handlers
//!
//! HTTP request handlers mapping each admin endpoint onto the cache module
//! contract.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio_util::sync::CancellationToken;

use crate::cache::{
    BatchResult, CacheStats, CapacityInfo, ErrorStatistics, GetOptions, HealthReport,
    HealthStatus, PerformanceMetrics, SetResult,
};
use crate::config::CacheConfiguration;
use crate::error::{CacheError, Result};
use crate::models::{
    BatchKeysRequest, BatchSetRequest, ClearRequest, ClearResponse, DeleteResponse,
    GetResponse, IncrementRequest, IncrementResponse, OperationResult, RestoreRequest,
    SetRequest, SetResponse, StatsQuery,
};
use crate::module::CacheModule;
use crate::ops::{
    BackupOptions, BackupResult, BenchmarkOptions, BenchmarkResult, DiagnosticsResult,
    IntegrityCheckOptions, IntegrityCheckResult, RestoreResult, SelfHealingResult,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The module served by this API
    pub module: Arc<dyn CacheModule>,
    /// Cancelled on server shutdown; long-running operations run on a child
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(module: Arc<dyn CacheModule>) -> Self {
        Self::with_shutdown(module, CancellationToken::new())
    }

    pub fn with_shutdown(module: Arc<dyn CacheModule>, shutdown: CancellationToken) -> Self {
        Self { module, shutdown }
    }
}

type Reply<T> = Result<Json<OperationResult<T>>>;

fn reply<T>(data: T) -> Reply<T> {
    Ok(Json(OperationResult::ok(data)))
}

// == Entry Handlers ==
/// Handler for GET /cache/:key
///
/// A miss is answered with 404 and `hit: false`.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(options): Query<GetOptions>,
) -> Result<(StatusCode, Json<OperationResult<GetResponse>>)> {
    let result = state.module.store()?.get(&key, options)?;
    let status = if result.hit {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(OperationResult::ok(GetResponse::new(key, result)))))
}

/// Handler for PUT /cache/:key
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Reply<SetResponse> {
    let result = state.module.store()?.set(&key, req.value, req.options)?;
    reply(SetResponse::new(key, result))
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Reply<DeleteResponse> {
    let deleted = state.module.store()?.delete(&key)?;
    reply(DeleteResponse { key, deleted })
}

/// Handler for POST /cache/:key/incr
pub async fn increment_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<IncrementRequest>,
) -> Reply<IncrementResponse> {
    let value = state.module.store()?.increment(&key, req.delta)?;
    reply(IncrementResponse { key, value })
}

/// Handler for POST /cache/clear
pub async fn clear_handler(
    State(state): State<AppState>,
    body: Option<Json<ClearRequest>>,
) -> Reply<ClearResponse> {
    let Json(req) = body.unwrap_or_default();
    let removed = state.module.store()?.clear(req.pattern.as_deref())?;
    reply(ClearResponse { removed })
}

// == Batch Handlers ==
/// Handler for POST /cache/batch/get
pub async fn batch_get_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchKeysRequest>,
) -> Reply<BatchResult<GetResponse>> {
    let results = state
        .module
        .store()?
        .batch_get(&req.keys)
        .map_values(|key, result| GetResponse::new(key, result));
    reply(results)
}

/// Handler for POST /cache/batch/set
pub async fn batch_set_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchSetRequest>,
) -> Reply<BatchResult<SetResult>> {
    reply(state.module.store()?.batch_set(req.items))
}

/// Handler for POST /cache/batch/delete
pub async fn batch_delete_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchKeysRequest>,
) -> Reply<BatchResult<u64>> {
    reply(
        state
            .module
            .store()?
            .batch_delete(&req.keys, req.continue_on_error),
    )
}

// == Monitoring Handlers ==
/// Handler for GET /stats
pub async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Reply<CacheStats> {
    reply(state.module.get_stats(query.time_range_ms))
}

/// Handler for GET /health
///
/// Answers 503 while the module is unhealthy.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<OperationResult<HealthReport>>) {
    let report = state.module.get_health();
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(OperationResult::ok(report)))
}

/// Handler for GET /metrics/performance
pub async fn performance_handler(State(state): State<AppState>) -> Reply<PerformanceMetrics> {
    reply(state.module.get_performance_metrics())
}

/// Handler for GET /capacity
pub async fn capacity_handler(State(state): State<AppState>) -> Reply<CapacityInfo> {
    reply(state.module.get_capacity_info())
}

/// Handler for GET /errors
pub async fn errors_handler(State(state): State<AppState>) -> Reply<ErrorStatistics> {
    reply(state.module.get_error_statistics())
}

// == Operations Handlers ==
/// Handler for POST /diagnostics
pub async fn diagnostics_handler(State(state): State<AppState>) -> Reply<DiagnosticsResult> {
    reply(state.module.run_diagnostics())
}

/// Handler for POST /self-heal
pub async fn self_heal_handler(State(state): State<AppState>) -> Reply<SelfHealingResult> {
    reply(state.module.attempt_self_healing())
}

/// Handler for POST /benchmark
pub async fn benchmark_handler(
    State(state): State<AppState>,
    body: Option<Json<BenchmarkOptions>>,
) -> Reply<BenchmarkResult> {
    let Json(options) = body.unwrap_or_default();
    let result = state
        .module
        .run_performance_benchmark(options, state.shutdown.child_token())
        .await?;
    reply(result)
}

/// Handler for POST /integrity
pub async fn integrity_handler(
    State(state): State<AppState>,
    body: Option<Json<IntegrityCheckOptions>>,
) -> Reply<IntegrityCheckResult> {
    let Json(options) = body.unwrap_or_default();
    let result = state
        .module
        .validate_data_integrity(options, state.shutdown.child_token())
        .await?;
    reply(result)
}

/// Handler for POST /backup
///
/// The payload is returned base64 encoded in `data`.
pub async fn backup_handler(
    State(state): State<AppState>,
    body: Option<Json<BackupOptions>>,
) -> Reply<BackupResult> {
    let Json(options) = body.unwrap_or_default();
    let cancel = state.shutdown.child_token();
    reply(state.module.create_backup(&options, &cancel)?)
}

/// Handler for POST /restore
pub async fn restore_handler(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> Reply<RestoreResult> {
    let data = BASE64
        .decode(&req.data)
        .map_err(|e| CacheError::Serialization(format!("backup data is not base64: {}", e)))?;
    let result = state
        .module
        .restore_from_backup(&data, req.options, state.shutdown.child_token())
        .await?;
    reply(result)
}

/// Handler for PUT /config
///
/// Replaces the whole configuration; omitted fields take their defaults.
pub async fn config_handler(
    State(state): State<AppState>,
    Json(config): Json<CacheConfiguration>,
) -> Reply<CacheConfiguration> {
    state.module.apply_config_update(config)?;
    let current = state.module.entry_store().config();
    reply(current.as_ref().clone())
}
