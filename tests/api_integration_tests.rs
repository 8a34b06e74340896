//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fincache::api::create_router;
use fincache::events::EventBus;
use fincache::{AppState, BasicCacheModule, CacheConfiguration, CacheModule, ConfigHandle};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

async fn create_test_app() -> Router {
    create_app_with(CacheConfiguration::default()).await
}

async fn create_app_with(config: CacheConfiguration) -> Router {
    let handle = ConfigHandle::new(config).unwrap();
    let module = BasicCacheModule::new("basic", handle, EventBus::disconnected("basic-cache"));
    module.initialize().await.unwrap();
    create_router(AppState::new(Arc::new(module)))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

// == Entry Endpoint Tests ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let app = create_test_app().await;

    let (status, json) = send(&app, "PUT", "/cache/test_key", Some(json!({"value": "test_value"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["key"], "test_key");
    assert_eq!(json["data"]["replaced"], false);
    assert_eq!(json["data"]["ttl"], 300);
}

#[tokio::test]
async fn test_set_endpoint_with_ttl_and_strategy() {
    let app = create_test_app().await;

    let (_, explicit) = send(&app, "PUT", "/cache/a", Some(json!({"value": "1", "ttl": 60}))).await;
    assert_eq!(explicit["data"]["ttl"], 60);

    let (_, strategy) = send(
        &app,
        "PUT",
        "/cache/b",
        Some(json!({"value": "1", "strategy": "STRONG_TIMELINESS"})),
    )
    .await;
    assert_eq!(strategy["data"]["ttl"], 5);
}

#[tokio::test]
async fn test_get_endpoint_roundtrip() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/quote:AAPL", Some(json!({"value": "189.52"}))).await;

    let (status, json) = send(&app, "GET", "/cache/quote:AAPL", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["hit"], true);
    assert_eq!(json["data"]["value"], "189.52");
    assert!(json["data"]["remaining_ttl"].as_u64().unwrap() <= 300);
}

#[tokio::test]
async fn test_get_missing_key_returns_404() {
    let app = create_test_app().await;

    let (status, json) = send(&app, "GET", "/cache/missing", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["data"]["hit"], false);
    assert!(json["data"]["value"].is_null());
}

#[tokio::test]
async fn test_delete_endpoint() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/gone", Some(json!({"value": "x"}))).await;

    let (_, first) = send(&app, "DELETE", "/cache/gone", None).await;
    let (_, second) = send(&app, "DELETE", "/cache/gone", None).await;

    assert_eq!(first["data"]["deleted"], 1);
    assert_eq!(second["data"]["deleted"], 0);
}

#[tokio::test]
async fn test_increment_endpoint() {
    let app = create_test_app().await;

    send(&app, "POST", "/cache/views/incr", Some(json!({}))).await;
    let (status, json) = send(&app, "POST", "/cache/views/incr", Some(json!({"delta": 5}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["value"], 6);
}

#[tokio::test]
async fn test_increment_non_numeric_is_type_mismatch() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/name", Some(json!({"value": "apple"}))).await;

    let (status, json) = send(&app, "POST", "/cache/name/incr", Some(json!({"delta": 1}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["kind"], "TYPE_MISMATCH");
}

#[tokio::test]
async fn test_clear_with_prefix() {
    let app = create_test_app().await;
    for key in ["quote:1", "quote:2", "symbol:1"] {
        send(&app, "PUT", &format!("/cache/{}", key), Some(json!({"value": "v"}))).await;
    }

    let (_, json) = send(&app, "POST", "/cache/clear", Some(json!({"pattern": "quote:*"}))).await;
    assert_eq!(json["data"]["removed"], 2);

    let (status, _) = send(&app, "GET", "/cache/symbol:1", None).await;
    assert_eq!(status, StatusCode::OK);
}

// == Error Format Tests ==

#[tokio::test]
async fn test_key_too_long_error_format() {
    let app = create_test_app().await;
    let uri = format!("/cache/{}", "k".repeat(300));

    let (status, json) = send(&app, "PUT", &uri, Some(json!({"value": "v"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["kind"], "INVALID_KEY");
    assert!(json["error"]["message"].as_str().unwrap().contains("Invalid key"));
}

#[tokio::test]
async fn test_value_too_large_returns_413() {
    let mut config = CacheConfiguration::default();
    config.limits.max_value_bytes = 8;
    let app = create_app_with(config).await;

    let (status, json) = send(&app, "PUT", "/cache/big", Some(json!({"value": "0123456789"}))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error"]["kind"], "VALUE_TOO_LARGE");
}

// == Batch Endpoint Tests ==

#[tokio::test]
async fn test_batch_set_and_get() {
    let app = create_test_app().await;

    let (_, set) = send(
        &app,
        "POST",
        "/cache/batch/set",
        Some(json!({"items": [
            {"key": "a", "value": "1"},
            {"key": "", "value": "2"},
            {"key": "c", "value": "3", "options": {"ttl": 10}}
        ]})),
    )
    .await;
    assert_eq!(set["data"]["success_count"], 2);
    assert_eq!(set["data"]["failure_count"], 1);
    assert_eq!(set["data"]["results"][1]["error"]["kind"], "INVALID_KEY");

    let (_, get) = send(&app, "POST", "/cache/batch/get", Some(json!({"keys": ["a", "missing", "c"]}))).await;
    let results = get["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["value"]["value"], "1");
    assert_eq!(results[1]["value"]["hit"], false);
    assert_eq!(results[2]["value"]["value"], "3");
}

#[tokio::test]
async fn test_batch_delete_stops_on_error() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/x", Some(json!({"value": "1"}))).await;

    let (_, json) = send(
        &app,
        "POST",
        "/cache/batch/delete",
        Some(json!({"keys": ["x", "", "y"], "continue_on_error": false})),
    )
    .await;

    let results = json["data"]["results"].as_array().unwrap();
    assert_eq!(results[0]["value"], 1);
    assert_eq!(results[1]["success"], false);
    assert_eq!(results[2]["error"]["kind"], "CANCELLED");
    assert_eq!(json["data"]["total_count"], 3);
}

// == Monitoring Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint_tracks_hits_and_misses() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/k", Some(json!({"value": "v"}))).await;
    send(&app, "GET", "/cache/k", None).await;
    send(&app, "GET", "/cache/k", None).await;
    send(&app, "GET", "/cache/nope", None).await;

    let (status, json) = send(&app, "GET", "/stats", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["hits"], 2);
    assert_eq!(json["data"]["misses"], 1);
    assert_eq!(json["data"]["key_count"], 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app().await;

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "healthy");
    assert!(json["data"]["health_score"].as_u64().unwrap() <= 100);
}

#[tokio::test]
async fn test_capacity_and_error_endpoints() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/a", Some(json!({"value": "v"}))).await;
    send(&app, "GET", &format!("/cache/{}", "k".repeat(300)), None).await;

    let (_, capacity) = send(&app, "GET", "/capacity", None).await;
    let current = capacity["data"]["current_keys"].as_u64().unwrap();
    let remaining = capacity["data"]["remaining_keys"].as_u64().unwrap();
    assert_eq!(current + remaining, capacity["data"]["max_keys"].as_u64().unwrap());

    let (_, errors) = send(&app, "GET", "/errors", None).await;
    assert_eq!(errors["data"]["total_errors"], 1);
    assert_eq!(errors["data"]["errors_by_kind"]["INVALID_KEY"], 1);

    let (status, _) = send(&app, "GET", "/metrics/performance", None).await;
    assert_eq!(status, StatusCode::OK);
}

// == Operations Endpoint Tests ==

#[tokio::test]
async fn test_diagnostics_and_self_heal() {
    let app = create_test_app().await;

    let (_, diagnostics) = send(&app, "POST", "/diagnostics", None).await;
    let score = diagnostics["data"]["overall_health_score"].as_u64().unwrap();
    assert!(score <= 100);
    assert!(!diagnostics["data"]["checks"].as_array().unwrap().is_empty());

    let (_, healing) = send(&app, "POST", "/self-heal", None).await;
    let fixes = healing["data"]["fixes"].as_array().unwrap();
    assert_eq!(fixes.len() as u64, healing["data"]["attempted_fixes"].as_u64().unwrap());
}

#[tokio::test]
async fn test_benchmark_endpoint() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/k", Some(json!({"value": "v"}))).await;
    send(&app, "GET", "/cache/k", None).await;
    let (_, before) = send(&app, "GET", "/stats", None).await;

    let (status, json) = send(
        &app,
        "POST",
        "/benchmark",
        Some(json!({"duration_ms": 200, "concurrency": 2, "key_space": 50, "data_size_bytes": 32})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["total_operations"].as_u64().unwrap() > 0);
    let (_, stats) = send(&app, "GET", "/stats", None).await;
    assert_eq!(stats["data"]["key_count"], 1, "synthetic keys are cleaned up");
    for field in ["hits", "misses", "total_operations", "error_count"] {
        assert_eq!(stats["data"][field], before["data"][field], "{} changed by the benchmark", field);
    }
    assert_eq!(stats["data"]["hits"], 1);
    assert_eq!(stats["data"]["misses"], 0);
}

#[tokio::test]
async fn test_benchmark_rejects_bad_weights() {
    let app = create_test_app().await;

    let (status, json) = send(
        &app,
        "POST",
        "/benchmark",
        Some(json!({"scenario": {"name": "broken", "operations": [
            {"op": "get", "weight": 0.5},
            {"op": "set", "weight": 0.2}
        ]}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["kind"], "INVALID_SCENARIO");
}

#[tokio::test]
async fn test_integrity_endpoint() {
    let app = create_test_app().await;
    send(&app, "PUT", "/cache/a", Some(json!({"value": "1"}))).await;

    let (status, json) = send(&app, "POST", "/integrity", Some(json!({"depth": "comprehensive"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["issues_found"], 0);
    assert_eq!(json["data"]["data_quality_score"], 100);
}

#[tokio::test]
async fn test_backup_restore_roundtrip() {
    let source = create_test_app().await;
    for i in 0..10 {
        send(&source, "PUT", &format!("/cache/quote:{}", i), Some(json!({"value": format!("{}.5", i)}))).await;
    }
    let (status, backup) = send(&source, "POST", "/backup", Some(json!({"pattern": "quote:*"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(backup["data"]["key_count"], 10);
    let data = backup["data"]["data"].as_str().unwrap().to_string();

    let target = create_test_app().await;
    let (status, restore) = send(&target, "POST", "/restore", Some(json!({"data": data, "validate": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restore["data"]["restored"], 10);
    assert_eq!(restore["data"]["failed"], 0);

    let (_, value) = send(&target, "GET", "/cache/quote:7", None).await;
    assert_eq!(value["data"]["value"], "7.5");
}

#[tokio::test]
async fn test_config_update_endpoint() {
    let app = create_test_app().await;

    let (status, json) = send(
        &app,
        "PUT",
        "/config",
        Some(json!({"ttl": {"default_ttl": 42}, "limits": {"eviction_policy": "lfu"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["ttl"]["default_ttl"], 42);
    assert_eq!(json["data"]["limits"]["eviction_policy"], "lfu");

    let (_, set) = send(&app, "PUT", "/cache/k", Some(json!({"value": "v"}))).await;
    assert_eq!(set["data"]["ttl"], 42);

    let (status, json) = send(&app, "PUT", "/config", Some(json!({"ttl": {"min_ttl": 100, "default_ttl": 10}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["kind"], "INVALID_CONFIG");
}

// == Concurrency Tests ==

#[tokio::test]
async fn test_concurrent_increments() {
    let app = create_test_app().await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                send(&app, "POST", "/cache/counter/incr", Some(json!({"delta": 1}))).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let (_, json) = send(&app, "GET", "/cache/counter", None).await;
    assert_eq!(json["data"]["value"], "100");
}
