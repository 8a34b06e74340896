//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the store contract, TTL selection, cleanup and
//! statistics against arbitrary inputs.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    clamp_ttl, percentile, run_cleanup_cycle, select_ttl, EntryStore, EvictionPolicy, GetOptions,
    ManualClock, MarketPhase, SetOptions, TtlContext, TtlStrategy,
};
use crate::config::{CacheConfiguration, ConfigHandle, TtlConfig};
use crate::events::EventBus;
use crate::ops::{BenchOp, BenchmarkScenario, WeightedOp};

// == Helpers ==
fn store_with(config: CacheConfiguration) -> (EntryStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let store = EntryStore::with_parts(
        ConfigHandle::new(config).unwrap(),
        clock.clone(),
        EventBus::disconnected("proptest"),
    );
    (store, clock)
}

fn store() -> EntryStore {
    store_with(CacheConfiguration::default()).0
}

// == Strategies ==
/// Generates valid cache keys (non-empty, within length limit)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,64}"
}

fn valid_value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn strategy_strategy() -> impl Strategy<Value = TtlStrategy> {
    prop_oneof![
        Just(TtlStrategy::StrongTimeliness),
        Just(TtlStrategy::NearRealTime),
        Just(TtlStrategy::WeakTimeliness),
        Just(TtlStrategy::MarketAware),
        Just(TtlStrategy::Adaptive),
        Just(TtlStrategy::Default),
    ]
}

fn phase_strategy() -> impl Strategy<Value = Option<MarketPhase>> {
    prop_oneof![
        Just(None),
        Just(Some(MarketPhase::Trading)),
        Just(Some(MarketPhase::OffHours)),
        Just(Some(MarketPhase::Weekend)),
    ]
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Vec<u8> },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    // A small key space so gets and deletes hit existing keys
    let key = "k[0-9]";
    prop_oneof![
        (key, valid_value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy(), compress in any::<bool>()) {
        let store = store();
        let opts = SetOptions { compress, ..SetOptions::default() };
        store.set(&key, value.clone(), opts).unwrap();

        let result = store.get(&key, GetOptions::default()).unwrap();
        prop_assert!(result.hit);
        let data = result.data.unwrap();
        prop_assert_eq!(data.as_ref(), value.as_slice());
    }

    #[test]
    fn prop_delete_removes_entry(key in valid_key_strategy(), value in valid_value_strategy()) {
        let store = store();
        store.set(&key, value, SetOptions::default()).unwrap();

        prop_assert_eq!(store.delete(&key).unwrap(), 1);
        prop_assert!(!store.get(&key, GetOptions::default()).unwrap().hit);
        prop_assert_eq!(store.delete(&key).unwrap(), 0);
    }

    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        first in valid_value_strategy(),
        second in valid_value_strategy(),
    ) {
        let store = store();
        prop_assert!(!store.set(&key, first, SetOptions::default()).unwrap().replaced);
        prop_assert!(store.set(&key, second.clone(), SetOptions::default()).unwrap().replaced);

        let data = store.get(&key, GetOptions::default()).unwrap().data.unwrap();
        prop_assert_eq!(data.as_ref(), second.as_slice());
        prop_assert_eq!(store.keys(None).len(), 1);
    }

    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let store = store();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(&key, value, SetOptions::default()).unwrap();
                }
                CacheOp::Get { key } => {
                    if store.get(&key, GetOptions::default()).unwrap().hit {
                        expected_hits += 1;
                    } else {
                        expected_misses += 1;
                    }
                }
                CacheOp::Delete { key } => {
                    store.delete(&key).unwrap();
                }
            }
        }

        let stats = store.monitor().stats(&store.usage(), None);
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.key_count, store.keys(None).len(), "Key count mismatch");
    }

    #[test]
    fn prop_error_severities_sum_to_total(
        bad_keys in prop::collection::vec(prop_oneof![Just(String::new()), "[a-z]{300,320}"], 1..20),
    ) {
        let store = store();
        for key in &bad_keys {
            prop_assert!(store.get(key, GetOptions::default()).is_err());
        }
        prop_assert!(store.set("big", vec![0u8; 2 * 1024 * 1024], SetOptions::default()).is_err());

        let errors = store.monitor().error_statistics();
        prop_assert_eq!(errors.total_errors, bad_keys.len() as u64 + 1);
        prop_assert_eq!(errors.errors_by_severity.values().sum::<u64>(), errors.total_errors);
        prop_assert_eq!(errors.errors_by_kind.values().sum::<u64>(), errors.total_errors);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_selected_ttl_within_bounds(
        strategy in strategy_strategy(),
        phase in phase_strategy(),
        hit_rate in prop::option::of(-1.0f64..2.0),
        min in 1u64..100,
        spread in 0u64..10_000,
        raw in prop::array::uniform6(0u64..50_000),
    ) {
        let max = min + spread;
        let config = TtlConfig {
            min_ttl: min,
            default_ttl: min + spread / 2,
            max_ttl: max,
            real_time_ttl: raw[0],
            near_real_time_ttl: raw[1],
            batch_ttl: raw[2],
            trading_hours_ttl: raw[3],
            off_hours_ttl: raw[4],
            weekend_ttl: raw[5],
        };
        let context = TtlContext { market_phase: phase, hit_rate };

        let ttl = select_ttl(strategy, &context, &config);
        prop_assert!(ttl >= min && ttl <= max, "ttl {} outside [{}, {}]", ttl, min, max);
        prop_assert_eq!(ttl, select_ttl(strategy, &context, &config));
        prop_assert_eq!(clamp_ttl(ttl, &config), ttl);
    }

    #[test]
    fn prop_percentiles_are_monotone(mut samples in prop::collection::vec(0u64..1_000_000, 1..500)) {
        samples.sort_unstable();
        let p50 = percentile(&samples, 0.50);
        let p95 = percentile(&samples, 0.95);
        let p99 = percentile(&samples, 0.99);
        let p999 = percentile(&samples, 0.999);
        prop_assert!(p50 <= p95 && p95 <= p99 && p99 <= p999);
        prop_assert!(p999 <= *samples.last().unwrap());
    }

    #[test]
    fn prop_scenario_weights_validated(raw in prop::collection::vec(0.01f64..10.0, 1..6), scale in 0.5f64..1.5) {
        let total: f64 = raw.iter().sum();
        let ops = [BenchOp::Get, BenchOp::Set, BenchOp::Delete, BenchOp::Exists, BenchOp::Increment, BenchOp::BatchGet];
        let operations: Vec<WeightedOp> = raw
            .iter()
            .zip(ops)
            .map(|(w, op)| WeightedOp { op, weight: w / total * scale })
            .collect();
        let scenario = BenchmarkScenario { name: "generated".into(), operations };

        let valid = (scale - 1.0).abs() <= 0.0099;
        let invalid = (scale - 1.0).abs() > 0.0101;
        if valid {
            prop_assert!(scenario.validate().is_ok());
        } else if invalid {
            prop_assert!(scenario.validate().is_err());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_ttl_expiration_behavior(ttl in 1u64..120, values in prop::collection::vec(valid_value_strategy(), 1..20)) {
        let (store, clock) = store_with(CacheConfiguration::default());
        for (i, value) in values.iter().enumerate() {
            store.set(&format!("k{}", i), value.clone(), SetOptions::with_ttl(ttl)).unwrap();
        }

        clock.advance(Duration::from_millis(ttl * 1000 - 1));
        prop_assert_eq!(store.keys(None).len(), values.len());

        clock.advance(Duration::from_millis(1));
        prop_assert!(store.keys(None).is_empty());
        prop_assert!(!store.get("k0", GetOptions::default()).unwrap().hit);
    }

    #[test]
    fn prop_cleanup_meets_threshold_or_empties(
        policy in prop_oneof![
            Just(EvictionPolicy::Lru),
            Just(EvictionPolicy::Lfu),
            Just(EvictionPolicy::Fifo),
            Just(EvictionPolicy::Random),
        ],
        sizes in prop::collection::vec(64usize..2_048, 1..80),
        reads in prop::collection::vec(0usize..80, 0..40),
    ) {
        let mut config = CacheConfiguration::default();
        config.performance.max_memory_bytes = 64 * 1024;
        config.limits.memory_threshold_ratio = 0.5;
        config.limits.cleanup_percentage = 1.0;
        config.limits.eviction_policy = policy;
        let (store, clock) = store_with(config);

        for (i, size) in sizes.iter().enumerate() {
            let _ = store.set(&format!("quote:{}", i), vec![b'x'; *size], SetOptions::default());
            clock.advance(Duration::from_millis(1));
        }
        for idx in reads {
            let _ = store.get(&format!("quote:{}", idx), GetOptions::default());
        }

        let report = run_cleanup_cycle(&store);
        prop_assert!(report.threshold_met || store.is_empty());
        prop_assert!(report.utilization_after <= report.utilization_before);
    }
}

#[test]
fn test_concurrent_increments_are_atomic() {
    let store = Arc::new(store());
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    store.increment("counter", 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let value = store.get("counter", GetOptions::default()).unwrap().data.unwrap();
    assert_eq!(value.as_ref(), b"100");
}

#[test]
fn test_sweep_with_manual_clock() {
    let (store, clock) = store_with(CacheConfiguration::default());
    for i in 0..1000 {
        store
            .set(&format!("tick:{}", i), "1", SetOptions::with_ttl(1))
            .unwrap();
    }
    clock.advance(Duration::from_secs(2));

    let report = run_cleanup_cycle(&store);
    assert_eq!(report.expired_removed, 1000);
    assert_eq!(store.len(), 0);
}

#[test]
fn test_tags_survive_roundtrip() {
    let store = store();
    let tags: HashMap<String, String> = [("source".to_string(), "feed".to_string())].into();
    let opts = SetOptions {
        tags: tags.clone(),
        ..SetOptions::default()
    };
    store.set("tagged", "v", opts).unwrap();
    let entry = store.snapshot(Some("tagged")).pop().unwrap();
    assert_eq!(entry.tags, tags);
}
