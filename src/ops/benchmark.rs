//! Benchmark Runner
//!
//! Drives weighted synthetic load through the public store contract and
//! aggregates throughput and latency figures.
//!
//! Synthetic keys live under [`BENCH_PREFIX`] and are cleared after the run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{percentile, EntryStore, GetOptions, SetOptions, SYNTHETIC_PREFIX};
use crate::error::{CacheError, Result};

/// Reserved key prefix for synthetic benchmark keys. The store keeps their
/// figures out of the module statistics.
pub const BENCH_PREFIX: &str = SYNTHETIC_PREFIX;

const WEIGHT_TOLERANCE: f64 = 0.01;
const RESOURCE_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const BATCH_GET_SIZE: usize = 10;

// == Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchOp {
    Get,
    Set,
    Delete,
    Exists,
    Increment,
    BatchGet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedOp {
    pub op: BenchOp,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkScenario {
    pub name: String,
    pub operations: Vec<WeightedOp>,
}

impl Default for BenchmarkScenario {
    /// Read-heavy mix typical for quote lookups.
    fn default() -> Self {
        Self {
            name: "read_heavy".to_string(),
            operations: vec![
                WeightedOp { op: BenchOp::Get, weight: 0.7 },
                WeightedOp { op: BenchOp::Set, weight: 0.25 },
                WeightedOp { op: BenchOp::Delete, weight: 0.05 },
            ],
        }
    }
}

impl BenchmarkScenario {
    /// Rejects empty scenarios, negative weights and weights not summing to 1.
    pub fn validate(&self) -> Result<()> {
        if self.operations.is_empty() {
            return Err(CacheError::InvalidScenario(format!(
                "scenario '{}' has no operations",
                self.name
            )));
        }
        if self
            .operations
            .iter()
            .any(|o| o.weight < 0.0 || o.weight.is_nan())
        {
            return Err(CacheError::InvalidScenario(format!(
                "scenario '{}' has a negative weight",
                self.name
            )));
        }
        let sum: f64 = self.operations.iter().map(|o| o.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(CacheError::InvalidScenario(format!(
                "weights of scenario '{}' sum to {:.3}, expected 1.0",
                self.name, sum
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkOptions {
    pub duration_ms: u64,
    pub concurrency: usize,
    pub data_size_bytes: usize,
    /// Number of distinct synthetic keys
    pub key_space: usize,
    /// Prefill the key space before measuring
    pub warmup: bool,
    /// Overall deadline; defaults to the configured operation timeout
    pub timeout_ms: Option<u64>,
    pub scenario: BenchmarkScenario,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            duration_ms: 1_000,
            concurrency: 4,
            data_size_bytes: 256,
            key_space: 1_000,
            warmup: true,
            timeout_ms: None,
            scenario: BenchmarkScenario::default(),
        }
    }
}

// == Result ==
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyDistribution {
    pub min_ms: f64,
    pub average_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationBreakdown {
    pub count: u64,
    pub average_latency_ms: f64,
    pub throughput_ops_per_sec: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSample {
    pub elapsed_ms: u64,
    pub entries: usize,
    pub memory_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub scenario: String,
    /// Set when the run was cancelled or hit its deadline early
    pub partial: bool,
    pub duration_ms: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub average_throughput: f64,
    /// Highest operation count of any one-second bucket
    pub peak_throughput: f64,
    pub latency: LatencyDistribution,
    pub per_operation: BTreeMap<BenchOp, OperationBreakdown>,
    pub resource_samples: Vec<ResourceSample>,
    pub keys_cleaned: usize,
    pub cleanup_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    op: BenchOp,
    offset_ms: u64,
    latency_us: u64,
    ok: bool,
}

// == Runner ==
/// Runs a benchmark against `store`.
///
/// # Errors
/// `InvalidScenario` when the options or weights are malformed. Cancellation
/// and timeouts do not error; they return a result with `partial = true`.
pub async fn run_benchmark(
    store: Arc<EntryStore>,
    options: BenchmarkOptions,
    cancel: CancellationToken,
) -> Result<BenchmarkResult> {
    options.scenario.validate()?;
    if options.concurrency == 0 || options.duration_ms == 0 || options.key_space == 0 {
        return Err(CacheError::InvalidScenario(
            "duration_ms, concurrency and key_space must be positive".to_string(),
        ));
    }
    let config = store.config();
    if options.data_size_bytes > config.limits.max_value_bytes {
        return Err(CacheError::InvalidScenario(format!(
            "data_size_bytes {} exceeds max_value_bytes {}",
            options.data_size_bytes, config.limits.max_value_bytes
        )));
    }
    let weights: Vec<f64> = options.scenario.operations.iter().map(|o| o.weight).collect();
    let distribution = WeightedIndex::new(&weights)
        .map_err(|e| CacheError::InvalidScenario(e.to_string()))?;
    let ops: Arc<[BenchOp]> = options.scenario.operations.iter().map(|o| o.op).collect();
    let payload = Bytes::from(vec![b'x'; options.data_size_bytes]);

    if options.warmup {
        for i in 0..options.key_space {
            let _ = store.set(&bench_key(i), payload.clone(), SetOptions::default());
        }
    }

    let timeout_ms = options.timeout_ms.unwrap_or(config.performance.operation_timeout_ms);
    let run_for = Duration::from_millis(options.duration_ms.min(timeout_ms));
    let timed_out = timeout_ms < options.duration_ms;
    let started = Instant::now();
    let deadline = started + run_for;

    info!(
        "Benchmark '{}' starting: {} workers for {:?}",
        options.scenario.name, options.concurrency, run_for
    );

    let mut workers = JoinSet::new();
    for _ in 0..options.concurrency {
        let store = store.clone();
        let cancel = cancel.clone();
        let ops = ops.clone();
        let distribution = distribution.clone();
        let payload = payload.clone();
        let key_space = options.key_space;
        workers.spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut samples = Vec::new();
            while Instant::now() < deadline && !cancel.is_cancelled() {
                let op = ops[distribution.sample(&mut rng)];
                let key = rng.gen_range(0..key_space);
                let began = Instant::now();
                let ok = execute(&store, op, key, key_space, &payload);
                samples.push(Sample {
                    op,
                    offset_ms: began.duration_since(started).as_millis() as u64,
                    latency_us: began.elapsed().as_micros() as u64,
                    ok,
                });
                tokio::task::yield_now().await;
            }
            samples
        });
    }

    let mut samples = Vec::new();
    let mut resource_samples = Vec::new();
    let mut ticker = tokio::time::interval(RESOURCE_SAMPLE_INTERVAL);
    loop {
        tokio::select! {
            joined = workers.join_next() => match joined {
                Some(Ok(worker_samples)) => samples.extend(worker_samples),
                Some(Err(e)) => warn!("benchmark worker failed: {}", e),
                None => break,
            },
            _ = ticker.tick() => resource_samples.push(ResourceSample {
                elapsed_ms: started.elapsed().as_millis() as u64,
                entries: store.len(),
                memory_bytes: store.memory_usage(),
            }),
        }
    }
    let elapsed = started.elapsed();
    let partial = cancel.is_cancelled() || timed_out;

    let (keys_cleaned, cleanup_error) = match store.clear(Some(&format!("{}*", BENCH_PREFIX))) {
        Ok(removed) => (removed, None),
        Err(e) => {
            warn!("benchmark cleanup failed: {}", e);
            (0, Some(e.to_string()))
        }
    };

    let result = aggregate(
        &options.scenario.name,
        &samples,
        elapsed,
        partial,
        resource_samples,
        keys_cleaned,
        cleanup_error,
    );
    info!(
        "Benchmark '{}' finished: {} ops, {:.0} ops/s{}",
        result.scenario,
        result.total_operations,
        result.average_throughput,
        if result.partial { " (partial)" } else { "" }
    );
    Ok(result)
}

fn bench_key(i: usize) -> String {
    format!("{}{}", BENCH_PREFIX, i)
}

fn execute(store: &EntryStore, op: BenchOp, key: usize, key_space: usize, payload: &Bytes) -> bool {
    let name = bench_key(key);
    match op {
        BenchOp::Get => store.get(&name, GetOptions::default()).is_ok(),
        BenchOp::Set => store.set(&name, payload.clone(), SetOptions::default()).is_ok(),
        BenchOp::Delete => store.delete(&name).is_ok(),
        BenchOp::Exists => store.exists(&name).is_ok(),
        BenchOp::Increment => store
            .increment(&format!("{}ctr:{}", BENCH_PREFIX, key % 16), 1)
            .is_ok(),
        BenchOp::BatchGet => {
            let keys: Vec<String> = (0..BATCH_GET_SIZE)
                .map(|i| bench_key((key + i) % key_space))
                .collect();
            store.batch_get(&keys).failure_count == 0
        }
    }
}

fn aggregate(
    scenario: &str,
    samples: &[Sample],
    elapsed: Duration,
    partial: bool,
    resource_samples: Vec<ResourceSample>,
    keys_cleaned: usize,
    cleanup_error: Option<String>,
) -> BenchmarkResult {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let total = samples.len() as u64;
    let successful = samples.iter().filter(|s| s.ok).count() as u64;

    let mut latencies: Vec<u64> = samples.iter().map(|s| s.latency_us).collect();
    latencies.sort_unstable();
    let ms = |us: u64| us as f64 / 1000.0;
    let latency = if latencies.is_empty() {
        LatencyDistribution::default()
    } else {
        LatencyDistribution {
            min_ms: ms(latencies[0]),
            average_ms: latencies.iter().sum::<u64>() as f64 / latencies.len() as f64 / 1000.0,
            p50_ms: ms(percentile(&latencies, 0.50)),
            p95_ms: ms(percentile(&latencies, 0.95)),
            p99_ms: ms(percentile(&latencies, 0.99)),
            p999_ms: ms(percentile(&latencies, 0.999)),
            max_ms: ms(latencies[latencies.len() - 1]),
        }
    };

    let mut buckets: BTreeMap<u64, u64> = BTreeMap::new();
    for sample in samples {
        *buckets.entry(sample.offset_ms / 1000).or_default() += 1;
    }
    // a run shorter than one second is projected from its only bucket
    let peak = buckets.values().copied().max().unwrap_or(0) as f64;
    let peak_throughput = if secs < 1.0 { peak / secs } else { peak };

    let mut grouped: BTreeMap<BenchOp, (u64, u64, u64)> = BTreeMap::new();
    for sample in samples {
        let entry = grouped.entry(sample.op).or_default();
        entry.0 += 1;
        entry.1 += sample.latency_us;
        if !sample.ok {
            entry.2 += 1;
        }
    }
    let per_operation = grouped
        .into_iter()
        .map(|(op, (count, latency_us, errors))| {
            (
                op,
                OperationBreakdown {
                    count,
                    average_latency_ms: latency_us as f64 / count as f64 / 1000.0,
                    throughput_ops_per_sec: count as f64 / secs,
                    error_rate: errors as f64 / count as f64,
                },
            )
        })
        .collect();

    BenchmarkResult {
        scenario: scenario.to_string(),
        partial,
        duration_ms: elapsed.as_millis() as u64,
        total_operations: total,
        successful_operations: successful,
        failed_operations: total - successful,
        average_throughput: total as f64 / secs,
        peak_throughput: peak_throughput.max(total as f64 / secs),
        latency,
        per_operation,
        resource_samples,
        keys_cleaned,
        cleanup_error,
    }
}
