//! Configuration Module
//!
//! Immutable cache module configuration loaded from environment variables,
//! plus the handle used to hot-swap it.

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::error::{CacheError, Result};

// == TTL Parameters ==
/// Per-classification TTLs in seconds, with clamping bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub default_ttl: u64,
    pub min_ttl: u64,
    pub max_ttl: u64,
    pub real_time_ttl: u64,
    pub near_real_time_ttl: u64,
    pub batch_ttl: u64,
    pub trading_hours_ttl: u64,
    pub off_hours_ttl: u64,
    pub weekend_ttl: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            min_ttl: 1,
            max_ttl: 86_400,
            real_time_ttl: 5,
            near_real_time_ttl: 30,
            batch_ttl: 3_600,
            trading_hours_ttl: 10,
            off_hours_ttl: 600,
            weekend_ttl: 7_200,
        }
    }
}

// == Performance Parameters ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Memory budget used for utilization and eviction decisions
    pub max_memory_bytes: u64,
    pub default_batch_size: usize,
    pub max_concurrent_operations: usize,
    /// Operations slower than this are counted as slow
    pub slow_operation_threshold_ms: u64,
    /// Deadline for long-running tooling (benchmark, scans, backups)
    pub operation_timeout_ms: u64,
    /// Values below this size are never compressed
    pub compression_threshold_bytes: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 256 * 1024 * 1024,
            default_batch_size: 100,
            max_concurrent_operations: 64,
            slow_operation_threshold_ms: 100,
            operation_timeout_ms: 60_000,
            compression_threshold_bytes: 1024,
        }
    }
}

// == Interval Parameters ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub cleanup_interval_ms: u64,
    pub health_check_interval_ms: u64,
    pub metrics_collection_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 1_000,
            health_check_interval_ms: 30_000,
            metrics_collection_interval_ms: 10_000,
            heartbeat_interval_ms: 15_000,
        }
    }
}

// == Limits ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_key_length: usize,
    pub max_value_bytes: usize,
    pub max_entry_count: usize,
    /// Fraction of `max_memory_bytes` above which eviction starts
    pub memory_threshold_ratio: f64,
    /// Error rate above which a performance alert is raised
    pub error_rate_alert_threshold: f64,
    /// Upper bound on the fraction of entries removed in one eviction pass
    pub cleanup_percentage: f64,
    pub eviction_policy: EvictionPolicy,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_key_length: 256,
            max_value_bytes: 1024 * 1024,
            max_entry_count: 100_000,
            memory_threshold_ratio: 0.9,
            error_rate_alert_threshold: 0.05,
            cleanup_percentage: 0.25,
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}

// == Retry Parameters ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            multiplier: 2.0,
            max_delay_ms: 2_000,
            exponential_backoff: true,
        }
    }
}

// == Cache Configuration ==
/// Immutable per-module configuration snapshot.
///
/// Never mutated in place; hot reload builds a new value and swaps it through
/// [`ConfigHandle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfiguration {
    pub ttl: TtlConfig,
    pub performance: PerformanceConfig,
    pub intervals: IntervalConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
}

impl CacheConfiguration {
    /// Creates a configuration by overlaying environment variables on defaults.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES`, `MAX_MEMORY_BYTES`, `MAX_KEY_LENGTH`, `MAX_VALUE_BYTES`
    /// - `DEFAULT_TTL`, `MIN_TTL`, `MAX_TTL` (seconds)
    /// - `CLEANUP_INTERVAL_MS`, `HEALTH_CHECK_INTERVAL_MS`
    /// - `EVICTION_POLICY` (`lru`, `lfu`, `fifo`, `random`)
    /// - `MEMORY_THRESHOLD_RATIO`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.limits.max_entry_count = env_or("MAX_ENTRIES", config.limits.max_entry_count);
        config.performance.max_memory_bytes =
            env_or("MAX_MEMORY_BYTES", config.performance.max_memory_bytes);
        config.limits.max_key_length = env_or("MAX_KEY_LENGTH", config.limits.max_key_length);
        config.limits.max_value_bytes = env_or("MAX_VALUE_BYTES", config.limits.max_value_bytes);
        config.ttl.default_ttl = env_or("DEFAULT_TTL", config.ttl.default_ttl);
        config.ttl.min_ttl = env_or("MIN_TTL", config.ttl.min_ttl);
        config.ttl.max_ttl = env_or("MAX_TTL", config.ttl.max_ttl);
        config.intervals.cleanup_interval_ms =
            env_or("CLEANUP_INTERVAL_MS", config.intervals.cleanup_interval_ms);
        config.intervals.health_check_interval_ms = env_or(
            "HEALTH_CHECK_INTERVAL_MS",
            config.intervals.health_check_interval_ms,
        );
        config.limits.memory_threshold_ratio = env_or(
            "MEMORY_THRESHOLD_RATIO",
            config.limits.memory_threshold_ratio,
        );
        if let Ok(policy) = env::var("EVICTION_POLICY") {
            config.limits.eviction_policy = policy.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    // == Validate ==
    /// Rejects inconsistent bounds and out-of-range ratios.
    pub fn validate(&self) -> Result<()> {
        let ttl = &self.ttl;
        if !(ttl.min_ttl <= ttl.default_ttl && ttl.default_ttl <= ttl.max_ttl) {
            return Err(CacheError::InvalidConfig(format!(
                "TTL bounds violated: min {} <= default {} <= max {} must hold",
                ttl.min_ttl, ttl.default_ttl, ttl.max_ttl
            )));
        }
        let ratio = self.limits.memory_threshold_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "memory_threshold_ratio must be in (0, 1], got {}",
                ratio
            )));
        }
        let pct = self.limits.cleanup_percentage;
        if !(pct > 0.0 && pct <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "cleanup_percentage must be in (0, 1], got {}",
                pct
            )));
        }
        if self.limits.max_key_length == 0 || self.limits.max_entry_count == 0 {
            return Err(CacheError::InvalidConfig(
                "max_key_length and max_entry_count must be positive".to_string(),
            ));
        }
        if self.performance.max_memory_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_memory_bytes must be positive".to_string(),
            ));
        }
        if self.intervals.cleanup_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval_ms must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.multiplier < 1.0 {
            return Err(CacheError::InvalidConfig(
                "retry requires max_attempts >= 1 and multiplier >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

// == Config Handle ==
/// Atomically swappable reference to the current configuration.
///
/// Readers clone the inner `Arc` and keep using that snapshot for the rest of
/// their operation, so a concurrent reload never changes settings mid-flight.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<CacheConfiguration>>>,
    last_known_good: Arc<RwLock<Arc<CacheConfiguration>>>,
}

impl ConfigHandle {
    pub fn new(config: CacheConfiguration) -> Result<Self> {
        config.validate()?;
        let snapshot = Arc::new(config);
        Ok(Self {
            current: Arc::new(RwLock::new(snapshot.clone())),
            last_known_good: Arc::new(RwLock::new(snapshot)),
        })
    }

    /// Returns the snapshot in effect right now.
    pub fn load(&self) -> Arc<CacheConfiguration> {
        self.current.read().clone()
    }

    /// Validates and installs `config`, returning the replaced snapshot.
    pub fn swap(&self, config: CacheConfiguration) -> Result<Arc<CacheConfiguration>> {
        config.validate()?;
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(config));
        Ok(previous)
    }

    /// Records the current snapshot as known good.
    ///
    /// Diagnostics calls this whenever the configuration check passes.
    pub fn mark_known_good(&self) {
        let current = self.load();
        *self.last_known_good.write() = current;
    }

    /// The most recent snapshot recorded by [`ConfigHandle::mark_known_good`].
    pub fn last_known_good(&self) -> Arc<CacheConfiguration> {
        self.last_known_good.read().clone()
    }

    /// Reinstalls the last known good snapshot.
    pub fn restore_last_known_good(&self) {
        let good = self.last_known_good();
        *self.current.write() = good;
    }
}

// == Server Config ==
/// Settings for the admin HTTP binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name reported as the event source
    pub module_name: String,
    /// HTTP server port
    pub server_port: u16,
    /// Cache module settings
    pub cache: CacheConfiguration,
}

impl Config {
    /// Loads server and cache settings from environment variables.
    ///
    /// # Environment Variables
    /// - `MODULE_NAME` - Event source name (default: basic-cache)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - see [`CacheConfiguration::from_env`] for the cache settings
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            module_name: env::var("MODULE_NAME").unwrap_or_else(|_| "basic-cache".to_string()),
            server_port: env_or("SERVER_PORT", 3000),
            cache: CacheConfiguration::from_env()?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module_name: "basic-cache".to_string(),
            server_port: 3000,
            cache: CacheConfiguration::default(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
