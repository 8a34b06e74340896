//! Health Sampler Task
//!
//! Samples memory for capacity projections and publishes a health-change
//! event whenever the module's overall status moves.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::HealthStatus;
use crate::events::{EventSeverity, EventType};
use crate::module::CacheModule;

/// Spawns the periodic health sampler for `module`.
///
/// Runs every `health_check_interval_ms`, re-read each cycle.
pub fn spawn_health_task(module: Arc<dyn CacheModule>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting health sampler for {}", module.name());
        let mut last = HealthStatus::Healthy;

        loop {
            let store = module.entry_store();
            let interval = Duration::from_millis(store.config().intervals.health_check_interval_ms);
            tokio::time::sleep(interval).await;

            store.monitor().sample_capacity(store.memory_usage());
            let report = module.get_health();
            if report.status == last {
                debug!("{} health unchanged: {:?}", module.name(), report.status);
                continue;
            }

            let severity = match report.status {
                HealthStatus::Healthy => EventSeverity::Info,
                HealthStatus::Degraded => EventSeverity::Warn,
                HealthStatus::Unhealthy => EventSeverity::Error,
            };
            if report.status == HealthStatus::Healthy {
                info!("{} health recovered", module.name());
            } else {
                warn!("{} health is now {:?}", module.name(), report.status);
            }
            store.events().emit(
                EventType::HealthChange,
                severity,
                json!({
                    "previous": last,
                    "current": report.status,
                    "health_score": report.health_score,
                }),
            );
            last = report.status;
        }
    })
}
