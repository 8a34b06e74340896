//! fincache admin server
//!
//! Hosts one basic cache module behind the admin HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fincache::api::{create_router, AppState};
use fincache::events::{spawn_dispatcher, EventBus, EventSink, TracingSink, DEFAULT_EVENT_CAPACITY};
use fincache::{
    spawn_cleanup_task, spawn_health_task, BasicCacheModule, CacheModule, Config, ConfigHandle,
    ModuleRegistry,
};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Start the event dispatcher and register the module
/// 4. Initialize modules in dependency order
/// 5. Start background cleanup and health tasks
/// 6. Serve the admin API until SIGINT/SIGTERM, then shut modules down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fincache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting fincache server");

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "Configuration loaded: module={}, max_entries={}, default_ttl={}s, eviction={}, port={}",
        config.module_name,
        config.cache.limits.max_entry_count,
        config.cache.ttl.default_ttl,
        config.cache.limits.eviction_policy,
        config.server_port
    );

    let (bus, receiver) = EventBus::new(config.module_name.clone(), DEFAULT_EVENT_CAPACITY);
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    let dispatcher = spawn_dispatcher(receiver, sinks);

    let handle = ConfigHandle::new(config.cache.clone())?;
    let module: Arc<dyn CacheModule> = Arc::new(BasicCacheModule::new("basic", handle, bus));
    let mut registry = ModuleRegistry::new();
    registry.register(module.clone())?;
    let order = registry.initialize_all().await?;
    info!("Modules initialized: {}", order.join(" -> "));

    let background = vec![
        spawn_cleanup_task(module.entry_store().clone()),
        spawn_health_task(module.clone()),
    ];
    info!("Background tasks started");

    let shutdown = CancellationToken::new();
    let app = create_router(AppState::with_shutdown(module.clone(), shutdown.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown, background))
        .await
        .context("server error")?;

    if let Err(e) = registry.shutdown_all().await {
        warn!("Module shutdown reported an error: {}", e);
    }
    drop(registry);
    drop(module);
    if tokio::time::timeout(Duration::from_secs(2), dispatcher).await.is_err() {
        warn!("Event dispatcher did not drain in time");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown, cancels in-flight long-running operations and aborts the
/// background tasks.
async fn shutdown_signal(shutdown: CancellationToken, background: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    shutdown.cancel();
    for task in background {
        task.abort();
    }
    warn!("Background tasks aborted");
}
