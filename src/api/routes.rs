//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    backup_handler, batch_delete_handler, batch_get_handler, batch_set_handler,
    benchmark_handler, capacity_handler, clear_handler, config_handler, delete_handler,
    diagnostics_handler, errors_handler, get_handler, health_handler, increment_handler,
    integrity_handler, performance_handler, restore_handler, self_heal_handler, set_handler,
    stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Entries
        .route(
            "/cache/:key",
            get(get_handler).put(set_handler).delete(delete_handler),
        )
        .route("/cache/:key/incr", post(increment_handler))
        .route("/cache/clear", post(clear_handler))
        .route("/cache/batch/get", post(batch_get_handler))
        .route("/cache/batch/set", post(batch_set_handler))
        .route("/cache/batch/delete", post(batch_delete_handler))
        // Monitoring
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .route("/metrics/performance", get(performance_handler))
        .route("/capacity", get(capacity_handler))
        .route("/errors", get(errors_handler))
        // Operations
        .route("/diagnostics", post(diagnostics_handler))
        .route("/self-heal", post(self_heal_handler))
        .route("/benchmark", post(benchmark_handler))
        .route("/integrity", post(integrity_handler))
        .route("/backup", post(backup_handler))
        .route("/restore", post(restore_handler))
        .route("/config", put(config_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
