//! fincache - standardized cache module engine
//!
//! Sharded in-memory cache modules behind one contract, with TTL strategies,
//! policy eviction, monitoring, diagnostics and self-healing, benchmarks,
//! integrity checks and backup/restore. An optional admin HTTP surface maps
//! requests onto the contract.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod module;
pub mod ops;
pub mod retry;
pub mod tasks;

pub use api::AppState;
pub use config::{CacheConfiguration, Config, ConfigHandle};
pub use error::{CacheError, Result};
pub use module::{BasicCacheModule, CacheModule, ModuleRegistry};
pub use tasks::{spawn_cleanup_task, spawn_health_task};
