//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cleanup: expiry sweep and policy eviction at `cleanup_interval_ms`
//! - Health: capacity sampling and health-change events at
//!   `health_check_interval_ms`

mod cleanup;
mod health;

pub use cleanup::spawn_cleanup_task;
pub use health::spawn_health_task;
