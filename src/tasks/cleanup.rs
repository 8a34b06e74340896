//! Cleanup Task
//!
//! Background task that runs the expiry sweep and policy eviction on the
//! configured interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{run_cleanup_cycle, EntryStore};

/// Spawns a background task that periodically runs a cleanup cycle.
///
/// The interval is re-read from the store's configuration before every
/// sleep, so a hot reload takes effect on the next cycle.
///
/// # Arguments
/// * `store` - Shared reference to the entry store
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(store: Arc<EntryStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting cleanup task with interval of {} ms",
            store.config().intervals.cleanup_interval_ms
        );

        loop {
            let interval = Duration::from_millis(store.config().intervals.cleanup_interval_ms);
            tokio::time::sleep(interval).await;

            let report = run_cleanup_cycle(&store);
            if report.expired_removed > 0 || report.evicted > 0 {
                info!(
                    "Cleanup: removed {} expired, evicted {} entries",
                    report.expired_removed, report.evicted
                );
            } else {
                debug!("Cleanup: nothing to remove");
            }
        }
    })
}
