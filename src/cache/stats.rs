//! Stats & Health Monitor
//!
//! Tracks per-operation latency and outcome, errors, and capacity samples, and
//! derives stats, health, performance, capacity and error snapshots on demand.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Clock;
use crate::error::{CacheError, ErrorKind, ErrorSeverity};

/// Latency samples retained for percentile and windowed stats.
pub const MAX_LATENCY_SAMPLES: usize = 10_000;
/// Recent errors retained with context.
pub const MAX_RECENT_ERRORS: usize = 100;
/// Width of one error-trend bucket.
pub const ERROR_TREND_BUCKET_MS: u64 = 60_000;
/// Number of error-trend buckets kept.
pub const ERROR_TREND_BUCKETS: usize = 10;
/// Capacity samples kept for growth projection.
pub const MAX_CAPACITY_SAMPLES: usize = 60;
/// Window used for throughput.
const THROUGHPUT_WINDOW_MS: u64 = 60_000;

// == Operation Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Get,
    Set,
    Delete,
    Exists,
    Ttl,
    Expire,
    Clear,
    Increment,
    SetIfNotExists,
    GetOrSet,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Get => "get",
            OpKind::Set => "set",
            OpKind::Delete => "delete",
            OpKind::Exists => "exists",
            OpKind::Ttl => "ttl",
            OpKind::Expire => "expire",
            OpKind::Clear => "clear",
            OpKind::Increment => "increment",
            OpKind::SetIfNotExists => "set_if_not_exists",
            OpKind::GetOrSet => "get_or_set",
        }
    }
}

/// Result class of a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Hit,
    Miss,
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy)]
struct OpSample {
    at_ms: u64,
    latency_us: u64,
    outcome: OpOutcome,
}

/// Store-side figures the monitor cannot observe itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreUsage {
    /// Physically stored entries, including lazily expired ones
    pub key_count: usize,
    pub live_key_count: usize,
    pub memory_bytes: usize,
    pub live_memory_bytes: usize,
    pub max_keys: usize,
    pub max_memory_bytes: u64,
}

impl StoreUsage {
    pub fn memory_ratio(&self) -> f64 {
        ratio(self.memory_bytes as f64, self.max_memory_bytes as f64)
    }

    /// Live keys over the entry limit.
    pub fn key_ratio(&self) -> f64 {
        ratio(self.live_key_count as f64, self.max_keys as f64)
    }
}

// == Snapshots ==
/// Result of `get_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_operations: u64,
    pub key_count: usize,
    pub memory_bytes: usize,
    pub memory_ratio: f64,
    pub average_latency_ms: f64,
    pub error_count: u64,
    pub error_rate: f64,
    pub slow_operations: u64,
    pub evictions: u64,
    pub expired_removed: u64,
    /// Window the figures were computed over; None = since last reset
    pub time_range_ms: Option<u64>,
    pub last_reset: Option<DateTime<Utc>>,
    pub last_cleanup: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of `get_health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub connection: HealthStatus,
    pub memory: HealthStatus,
    pub performance: HealthStatus,
    pub error_rate: HealthStatus,
    /// 0–100, decreasing in error rate and memory pressure
    pub health_score: u8,
    pub uptime_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Result of `get_performance_metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub throughput_ops_per_sec: f64,
    pub hit_rate: f64,
    pub error_rate: f64,
    /// Share of accounted memory held by live entries
    pub memory_efficiency: f64,
    pub cpu_usage: Option<f64>,
    pub network_usage: Option<f64>,
}

/// Result of `get_capacity_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityInfo {
    pub current_keys: usize,
    pub max_keys: usize,
    pub remaining_keys: usize,
    pub current_memory_bytes: u64,
    pub max_memory_bytes: u64,
    pub remaining_memory_bytes: u64,
    pub key_utilization: f64,
    pub memory_utilization: f64,
    /// Memory growth in bytes/sec over the sampled window
    pub growth_rate_bytes_per_sec: f64,
    /// Seconds until memory is exhausted at the current growth rate
    pub estimated_seconds_to_full: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub operation: String,
    pub key: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket_start: DateTime<Utc>,
    pub count: u64,
}

/// Result of `get_error_statistics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub total_errors: u64,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    /// Always carries all four severities; values sum to `total_errors`
    pub errors_by_severity: BTreeMap<ErrorSeverity, u64>,
    pub recent_errors: Vec<ErrorRecord>,
    pub error_trend: Vec<TrendPoint>,
}

#[derive(Debug, Default)]
struct ErrorLog {
    total: u64,
    by_kind: BTreeMap<ErrorKind, u64>,
    by_severity: BTreeMap<ErrorSeverity, u64>,
    recent: VecDeque<ErrorRecord>,
    trend: VecDeque<(u64, u64)>,
}

// == Stats Monitor ==
/// Shared counters for one cache module.
#[derive(Debug)]
pub struct StatsMonitor {
    clock: Arc<dyn Clock>,
    started_at_ms: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    operations: AtomicU64,
    errors: AtomicU64,
    slow_operations: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
    slow_threshold_us: AtomicU64,
    last_reset_ms: AtomicU64,
    last_cleanup_ms: AtomicU64,
    samples: Mutex<VecDeque<OpSample>>,
    error_log: Mutex<ErrorLog>,
    capacity_samples: Mutex<VecDeque<(u64, usize)>>,
}

impl StatsMonitor {
    // == Constructor ==
    pub fn new(clock: Arc<dyn Clock>, slow_threshold: Duration) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            started_at_ms: now,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            operations: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            slow_operations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_removed: AtomicU64::new(0),
            slow_threshold_us: AtomicU64::new(slow_threshold.as_micros() as u64),
            last_reset_ms: AtomicU64::new(0),
            last_cleanup_ms: AtomicU64::new(0),
            samples: Mutex::new(VecDeque::with_capacity(1024)),
            error_log: Mutex::new(ErrorLog::default()),
            capacity_samples: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_slow_threshold(&self, threshold: Duration) {
        self.slow_threshold_us
            .store(threshold.as_micros() as u64, Ordering::Relaxed);
    }

    // == Recording ==
    /// Records one completed operation.
    pub fn record(&self, latency: Duration, outcome: OpOutcome) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        match outcome {
            OpOutcome::Hit => {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            OpOutcome::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
            OpOutcome::Ok | OpOutcome::Error => {}
        }
        let latency_us = latency.as_micros() as u64;
        if latency_us >= self.slow_threshold_us.load(Ordering::Relaxed) {
            self.slow_operations.fetch_add(1, Ordering::Relaxed);
        }

        let sample = OpSample {
            at_ms: self.clock.now_ms(),
            latency_us,
            outcome,
        };
        let mut samples = self.samples.lock();
        if samples.len() == MAX_LATENCY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Records a failed operation and its error context.
    pub fn record_error(&self, op: OpKind, latency: Duration, error: &CacheError, key: Option<&str>) {
        self.record(latency, OpOutcome::Error);
        self.record_failure(op.as_str(), error, key);
    }

    /// Records an error that did not come from a timed operation.
    pub fn record_failure(&self, operation: &str, error: &CacheError, key: Option<&str>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now_ms();
        let kind = error.kind();
        let severity = error.severity();

        let mut log = self.error_log.lock();
        log.total += 1;
        *log.by_kind.entry(kind).or_insert(0) += 1;
        *log.by_severity.entry(severity).or_insert(0) += 1;
        if log.recent.len() == MAX_RECENT_ERRORS {
            log.recent.pop_front();
        }
        log.recent.push_back(ErrorRecord {
            timestamp: to_datetime(now),
            kind,
            severity,
            operation: operation.to_string(),
            key: key.map(str::to_string),
            message: error.to_string(),
        });

        let bucket = now - now % ERROR_TREND_BUCKET_MS;
        match log.trend.back_mut() {
            Some((start, count)) if *start == bucket => *count += 1,
            _ => {
                log.trend.push_back((bucket, 1));
                if log.trend.len() > ERROR_TREND_BUCKETS {
                    log.trend.pop_front();
                }
            }
        }
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cleanup(&self, expired_removed: u64) {
        self.expired_removed
            .fetch_add(expired_removed, Ordering::Relaxed);
        self.last_cleanup_ms
            .store(self.clock.now_ms(), Ordering::Relaxed);
    }

    /// Adds a point to the capacity growth series.
    pub fn sample_capacity(&self, memory_bytes: usize) {
        let mut samples = self.capacity_samples.lock();
        if samples.len() == MAX_CAPACITY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back((self.clock.now_ms(), memory_bytes));
    }

    // == Reset ==
    /// Zeroes operation and error counters.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.operations,
            &self.errors,
            &self.slow_operations,
            &self.evictions,
            &self.expired_removed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.samples.lock().clear();
        *self.error_log.lock() = ErrorLog::default();
        self.last_reset_ms
            .store(self.clock.now_ms(), Ordering::Relaxed);
    }

    /// Zeroes only the error counters.
    pub fn reset_errors(&self) {
        self.errors.store(0, Ordering::Relaxed);
        *self.error_log.lock() = ErrorLog::default();
        let mut samples = self.samples.lock();
        samples.retain(|s| s.outcome != OpOutcome::Error);
    }

    // == Accessors ==
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        ratio(hits, hits + misses)
    }

    pub fn error_rate(&self) -> f64 {
        ratio(
            self.errors.load(Ordering::Relaxed) as f64,
            self.operations.load(Ordering::Relaxed) as f64,
        )
    }

    pub fn total_operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn uptime_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.started_at_ms)
    }

    // == Get Stats ==
    /// Builds the stats snapshot, optionally restricted to the last
    /// `time_range_ms` milliseconds of sampled operations.
    pub fn stats(&self, usage: &StoreUsage, time_range_ms: Option<u64>) -> CacheStats {
        let (hits, misses, operations, errors, avg_latency_ms) = match time_range_ms {
            None => (
                self.hits.load(Ordering::Relaxed),
                self.misses.load(Ordering::Relaxed),
                self.operations.load(Ordering::Relaxed),
                self.errors.load(Ordering::Relaxed),
                self.average_latency_ms(),
            ),
            Some(range) => {
                let since = self.clock.now_ms().saturating_sub(range);
                let samples = self.samples.lock();
                let window: Vec<&OpSample> = samples.iter().filter(|s| s.at_ms >= since).collect();
                let count = |o: OpOutcome| window.iter().filter(|s| s.outcome == o).count() as u64;
                let total_us: u64 = window.iter().map(|s| s.latency_us).sum();
                let avg = if window.is_empty() {
                    0.0
                } else {
                    total_us as f64 / window.len() as f64 / 1000.0
                };
                (
                    count(OpOutcome::Hit),
                    count(OpOutcome::Miss),
                    window.len() as u64,
                    count(OpOutcome::Error),
                    avg,
                )
            }
        };

        CacheStats {
            hits,
            misses,
            hit_rate: ratio(hits as f64, (hits + misses) as f64),
            total_operations: operations,
            key_count: usage.live_key_count,
            memory_bytes: usage.memory_bytes,
            memory_ratio: usage.memory_ratio(),
            average_latency_ms: avg_latency_ms,
            error_count: errors,
            error_rate: ratio(errors as f64, operations as f64),
            slow_operations: self.slow_operations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            time_range_ms,
            last_reset: optional_datetime(self.last_reset_ms.load(Ordering::Relaxed)),
            last_cleanup: optional_datetime(self.last_cleanup_ms.load(Ordering::Relaxed)),
        }
    }

    // == Get Health ==
    pub fn health(&self, usage: &StoreUsage, error_alert_threshold: f64, initialized: bool) -> HealthReport {
        let error_rate = self.error_rate();
        let memory_ratio = usage.memory_ratio();
        let p99 = self.latency_percentile_ms(0.99);

        let connection = if initialized {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        let memory = match memory_ratio {
            r if r >= 0.95 => HealthStatus::Unhealthy,
            r if r >= 0.8 => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        };
        let slow_ms = self.slow_threshold_us.load(Ordering::Relaxed) as f64 / 1000.0;
        let performance = if p99 >= slow_ms * 5.0 {
            HealthStatus::Unhealthy
        } else if p99 >= slow_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        let error_status = if error_rate >= error_alert_threshold * 2.0 {
            HealthStatus::Unhealthy
        } else if error_rate >= error_alert_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        let status = *[connection, memory, performance, error_status]
            .iter()
            .max()
            .unwrap_or(&HealthStatus::Healthy);

        HealthReport {
            status,
            connection,
            memory,
            performance,
            error_rate: error_status,
            health_score: health_score(error_rate, memory_ratio),
            uptime_ms: self.uptime_ms(),
            timestamp: to_datetime(self.clock.now_ms()),
        }
    }

    // == Get Performance Metrics ==
    pub fn performance(&self, usage: &StoreUsage) -> PerformanceMetrics {
        let now = self.clock.now_ms();
        let window = THROUGHPUT_WINDOW_MS.min(self.uptime_ms().max(1));
        let recent = {
            let samples = self.samples.lock();
            samples
                .iter()
                .filter(|s| s.at_ms + window >= now)
                .count()
        };

        PerformanceMetrics {
            average_latency_ms: self.average_latency_ms(),
            p95_latency_ms: self.latency_percentile_ms(0.95),
            p99_latency_ms: self.latency_percentile_ms(0.99),
            throughput_ops_per_sec: recent as f64 / (window as f64 / 1000.0),
            hit_rate: self.hit_rate(),
            error_rate: self.error_rate(),
            memory_efficiency: if usage.memory_bytes == 0 {
                1.0
            } else {
                ratio(usage.live_memory_bytes as f64, usage.memory_bytes as f64)
            },
            cpu_usage: None,
            network_usage: None,
        }
    }

    // == Get Capacity Info ==
    pub fn capacity(&self, usage: &StoreUsage) -> CapacityInfo {
        let current_memory = usage.memory_bytes as u64;
        let growth = {
            let samples = self.capacity_samples.lock();
            match (samples.front(), samples.back()) {
                (Some(&(t0, m0)), Some(&(t1, m1))) if t1 > t0 => {
                    (m1 as f64 - m0 as f64) / ((t1 - t0) as f64 / 1000.0)
                }
                _ => 0.0,
            }
        };
        let remaining_memory = usage.max_memory_bytes.saturating_sub(current_memory);

        CapacityInfo {
            current_keys: usage.live_key_count.min(usage.max_keys),
            max_keys: usage.max_keys,
            remaining_keys: usage.max_keys.saturating_sub(usage.live_key_count),
            current_memory_bytes: current_memory.min(usage.max_memory_bytes),
            max_memory_bytes: usage.max_memory_bytes,
            remaining_memory_bytes: remaining_memory,
            key_utilization: usage.key_ratio(),
            memory_utilization: usage.memory_ratio(),
            growth_rate_bytes_per_sec: growth,
            estimated_seconds_to_full: if growth > 0.0 {
                Some(remaining_memory as f64 / growth)
            } else {
                None
            },
        }
    }

    // == Get Error Statistics ==
    pub fn error_statistics(&self) -> ErrorStatistics {
        let log = self.error_log.lock();
        let mut by_severity = BTreeMap::new();
        for severity in ErrorSeverity::ALL {
            by_severity.insert(severity, log.by_severity.get(&severity).copied().unwrap_or(0));
        }
        ErrorStatistics {
            total_errors: log.total,
            errors_by_kind: log.by_kind.clone(),
            errors_by_severity: by_severity,
            recent_errors: log.recent.iter().cloned().collect(),
            error_trend: log
                .trend
                .iter()
                .map(|&(start, count)| TrendPoint {
                    bucket_start: to_datetime(start),
                    count,
                })
                .collect(),
        }
    }

    fn average_latency_ms(&self) -> f64 {
        let samples = self.samples.lock();
        let (sum, count) = samples
            .iter()
            .fold((0u64, 0u64), |(sum, n), s| (sum + s.latency_us, n + 1));
        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64 / 1000.0
        }
    }

    fn latency_percentile_ms(&self, p: f64) -> f64 {
        let mut latencies: Vec<u64> = self.samples.lock().iter().map(|s| s.latency_us).collect();
        latencies.sort_unstable();
        percentile(&latencies, p) as f64 / 1000.0
    }
}

// == Helpers ==
/// Nearest-rank percentile over an ascending slice; 0 for an empty slice.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// 0–100 score, non-increasing in both error rate and memory pressure.
pub fn health_score(error_rate: f64, memory_ratio: f64) -> u8 {
    let error_penalty = (error_rate / 0.5).clamp(0.0, 1.0) * 60.0;
    let memory_penalty = memory_ratio.clamp(0.0, 1.0).powi(2) * 40.0;
    (100.0 - error_penalty - memory_penalty).round().clamp(0.0, 100.0) as u8
}

/// `num / den` clamped into [0, 1], 0 when `den` is zero.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den <= 0.0 {
        0.0
    } else {
        (num / den).clamp(0.0, 1.0)
    }
}

pub fn to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

fn optional_datetime(ms: u64) -> Option<DateTime<Utc>> {
    (ms > 0).then(|| to_datetime(ms))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn monitor() -> (Arc<ManualClock>, StatsMonitor) {
        let clock = Arc::new(ManualClock::starting_at(1_000_000));
        let monitor = StatsMonitor::new(clock.clone(), Duration::from_millis(100));
        (clock, monitor)
    }

    fn usage() -> StoreUsage {
        StoreUsage {
            key_count: 10,
            live_key_count: 8,
            memory_bytes: 500,
            live_memory_bytes: 400,
            max_keys: 100,
            max_memory_bytes: 1_000,
        }
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let (_, monitor) = monitor();
        assert_eq!(monitor.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let (_, monitor) = monitor();
        monitor.record(Duration::from_micros(10), OpOutcome::Hit);
        monitor.record(Duration::from_micros(10), OpOutcome::Miss);
        assert_eq!(monitor.hit_rate(), 0.5);
        assert_eq!(monitor.total_operations(), 2);
    }

    #[test]
    fn test_stats_time_range_filters_samples() {
        let (clock, monitor) = monitor();
        monitor.record(Duration::from_millis(2), OpOutcome::Hit);
        clock.advance(Duration::from_secs(10));
        monitor.record(Duration::from_millis(4), OpOutcome::Miss);

        let all = monitor.stats(&usage(), None);
        assert_eq!(all.hits, 1);
        assert_eq!(all.misses, 1);

        let recent = monitor.stats(&usage(), Some(5_000));
        assert_eq!(recent.hits, 0);
        assert_eq!(recent.misses, 1);
        assert!((recent.average_latency_ms - 4.0).abs() < 1e-9);
        assert_eq!(recent.key_count, 8);
    }

    #[test]
    fn test_error_severity_sums_to_total() {
        let (_, monitor) = monitor();
        let errors = [
            CacheError::InvalidKey("k".into()),
            CacheError::TypeMismatch("k".into()),
            CacheError::Serialization("bad".into()),
            CacheError::CapacityExceeded("full".into()),
            CacheError::InvalidKey("j".into()),
        ];
        for e in &errors {
            monitor.record_error(OpKind::Set, Duration::from_micros(5), e, Some("k"));
        }

        let stats = monitor.error_statistics();
        assert_eq!(stats.total_errors, 5);
        assert_eq!(stats.errors_by_severity.len(), 4);
        assert_eq!(stats.errors_by_severity.values().sum::<u64>(), stats.total_errors);
        assert_eq!(stats.errors_by_kind[&ErrorKind::InvalidKey], 2);
        assert_eq!(stats.recent_errors.len(), 5);
        assert_eq!(stats.error_trend.iter().map(|p| p.count).sum::<u64>(), 5);
    }

    #[test]
    fn test_recent_errors_are_bounded() {
        let (_, monitor) = monitor();
        for _ in 0..(MAX_RECENT_ERRORS + 20) {
            monitor.record_failure("get", &CacheError::InvalidKey("k".into()), None);
        }
        let stats = monitor.error_statistics();
        assert_eq!(stats.recent_errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(stats.total_errors, (MAX_RECENT_ERRORS + 20) as u64);
    }

    #[test]
    fn test_health_score_monotonic() {
        assert_eq!(health_score(0.0, 0.0), 100);
        assert!(health_score(0.1, 0.0) >= health_score(0.2, 0.0));
        assert!(health_score(0.0, 0.5) >= health_score(0.0, 0.9));
        assert_eq!(health_score(1.0, 1.0), 0);
    }

    #[test]
    fn test_health_flags_memory_pressure() {
        let (_, monitor) = monitor();
        let mut pressured = usage();
        pressured.memory_bytes = 990;
        let report = monitor.health(&pressured, 0.05, true);
        assert_eq!(report.memory, HealthStatus::Unhealthy);
        assert_eq!(report.status, HealthStatus::Unhealthy);

        let report = monitor.health(&usage(), 0.05, false);
        assert_eq!(report.connection, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_capacity_projection() {
        let (clock, monitor) = monitor();
        monitor.sample_capacity(100);
        clock.advance(Duration::from_secs(10));
        monitor.sample_capacity(600);

        let info = monitor.capacity(&usage());
        assert_eq!(info.current_keys, monitor.stats(&usage(), None).key_count);
        assert!((info.key_utilization - 0.08).abs() < 1e-9);
        assert_eq!(info.current_keys + info.remaining_keys, info.max_keys);
        assert_eq!(
            info.current_memory_bytes + info.remaining_memory_bytes,
            info.max_memory_bytes
        );
        assert!((info.growth_rate_bytes_per_sec - 50.0).abs() < 1e-9);
        assert!((info.estimated_seconds_to_full.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let data: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&data, 0.5), 50);
        assert_eq!(percentile(&data, 0.99), 99);
        assert_eq!(percentile(&data, 1.0), 100);
        assert_eq!(percentile(&[], 0.5), 0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let (_, monitor) = monitor();
        monitor.record(Duration::from_micros(1), OpOutcome::Hit);
        monitor.record_failure("set", &CacheError::InvalidKey("k".into()), None);
        monitor.reset();

        let stats = monitor.stats(&usage(), None);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.error_count, 0);
        assert!(stats.last_reset.is_some());
    }
}
