//! TTL Strategy Selector
//!
//! Pure mapping from a data classification to a TTL in seconds. Every result
//! is clamped into `[min_ttl, max_ttl]` of the active configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::TtlConfig;
use crate::error::CacheError;

// == TTL Strategy ==
/// Timeliness classification of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TtlStrategy {
    /// Real-time tier, for quote-like data that changes constantly
    StrongTimeliness,
    /// Near-real-time tier
    NearRealTime,
    /// Batch tier, for slowly changing reference data
    WeakTimeliness,
    /// Depends on the current market session phase
    MarketAware,
    /// Scaled by the observed hit ratio
    Adaptive,
    /// The configured default TTL
    Default,
}

impl FromStr for TtlStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "strong_timeliness" | "real_time" => Ok(TtlStrategy::StrongTimeliness),
            "near_real_time" => Ok(TtlStrategy::NearRealTime),
            "weak_timeliness" | "batch" => Ok(TtlStrategy::WeakTimeliness),
            "market_aware" => Ok(TtlStrategy::MarketAware),
            "adaptive" => Ok(TtlStrategy::Adaptive),
            "default" => Ok(TtlStrategy::Default),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown TTL strategy '{}'",
                other
            ))),
        }
    }
}

// == Market Phase ==
/// Trading session phase, supplied by an external provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    Trading,
    OffHours,
    Weekend,
}

/// Source of the current market session phase.
pub trait MarketSessionProvider: Send + Sync {
    fn current_phase(&self) -> MarketPhase;
}

/// Provider that always reports the same phase.
#[derive(Debug, Clone, Copy)]
pub struct FixedSessionProvider(pub MarketPhase);

impl MarketSessionProvider for FixedSessionProvider {
    fn current_phase(&self) -> MarketPhase {
        self.0
    }
}

// == TTL Context ==
/// Inputs for strategies that depend on outside state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TtlContext {
    pub market_phase: Option<MarketPhase>,
    /// Observed hit ratio in [0, 1]
    pub hit_rate: Option<f64>,
}

// == Select TTL ==
/// Chooses the TTL in seconds for `strategy`.
///
/// MARKET_AWARE without a phase and ADAPTIVE without a hit ratio fall back to
/// the default TTL.
pub fn select_ttl(strategy: TtlStrategy, context: &TtlContext, config: &TtlConfig) -> u64 {
    let raw = match strategy {
        TtlStrategy::StrongTimeliness => config.real_time_ttl,
        TtlStrategy::NearRealTime => config.near_real_time_ttl,
        TtlStrategy::WeakTimeliness => config.batch_ttl,
        TtlStrategy::Default => config.default_ttl,
        TtlStrategy::MarketAware => match context.market_phase {
            Some(MarketPhase::Trading) => config.trading_hours_ttl,
            Some(MarketPhase::OffHours) => config.off_hours_ttl,
            Some(MarketPhase::Weekend) => config.weekend_ttl,
            None => config.default_ttl,
        },
        TtlStrategy::Adaptive => match context.hit_rate {
            Some(rate) if rate.is_finite() => adaptive_ttl(rate.clamp(0.0, 1.0), config),
            _ => config.default_ttl,
        },
    };
    clamp_ttl(raw, config)
}

/// Clamps `ttl` into the configured bounds.
pub fn clamp_ttl(ttl: u64, config: &TtlConfig) -> u64 {
    // max() first so an inverted range never panics
    ttl.max(config.min_ttl).min(config.max_ttl.max(config.min_ttl))
}

/// Piecewise-linear scale: 0.0 → min, 0.5 → default, 1.0 → max.
fn adaptive_ttl(hit_rate: f64, config: &TtlConfig) -> u64 {
    let min = config.min_ttl as f64;
    let default = config.default_ttl as f64;
    let max = config.max_ttl as f64;
    let ttl = if hit_rate >= 0.5 {
        default + (max - default) * (hit_rate - 0.5) * 2.0
    } else {
        min + (default - min) * hit_rate * 2.0
    };
    ttl.round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TtlConfig {
        TtlConfig::default()
    }

    #[test]
    fn test_fixed_tiers() {
        let ctx = TtlContext::default();
        assert_eq!(select_ttl(TtlStrategy::StrongTimeliness, &ctx, &config()), 5);
        assert_eq!(select_ttl(TtlStrategy::NearRealTime, &ctx, &config()), 30);
        assert_eq!(select_ttl(TtlStrategy::WeakTimeliness, &ctx, &config()), 3_600);
        assert_eq!(select_ttl(TtlStrategy::Default, &ctx, &config()), 300);
    }

    #[test]
    fn test_market_aware_phases() {
        let cfg = config();
        let at = |phase| TtlContext {
            market_phase: Some(phase),
            hit_rate: None,
        };
        let trading = select_ttl(TtlStrategy::MarketAware, &at(MarketPhase::Trading), &cfg);
        let off = select_ttl(TtlStrategy::MarketAware, &at(MarketPhase::OffHours), &cfg);
        let weekend = select_ttl(TtlStrategy::MarketAware, &at(MarketPhase::Weekend), &cfg);
        assert!(trading < off && off < weekend);
    }

    #[test]
    fn test_adaptive_scales_with_hit_rate() {
        let cfg = config();
        let with = |rate| TtlContext {
            market_phase: None,
            hit_rate: Some(rate),
        };
        assert_eq!(select_ttl(TtlStrategy::Adaptive, &with(0.0), &cfg), cfg.min_ttl);
        assert_eq!(select_ttl(TtlStrategy::Adaptive, &with(0.5), &cfg), cfg.default_ttl);
        assert_eq!(select_ttl(TtlStrategy::Adaptive, &with(1.0), &cfg), cfg.max_ttl);
        assert!(
            select_ttl(TtlStrategy::Adaptive, &with(0.9), &cfg)
                > select_ttl(TtlStrategy::Adaptive, &with(0.6), &cfg)
        );
    }

    #[test]
    fn test_results_are_clamped() {
        let mut cfg = config();
        cfg.min_ttl = 10;
        cfg.max_ttl = 1_000;
        let ctx = TtlContext::default();
        assert_eq!(select_ttl(TtlStrategy::StrongTimeliness, &ctx, &cfg), 10);
        assert_eq!(select_ttl(TtlStrategy::WeakTimeliness, &ctx, &cfg), 1_000);
    }

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!(
            "market-aware".parse::<TtlStrategy>().unwrap(),
            TtlStrategy::MarketAware
        );
        assert_eq!("batch".parse::<TtlStrategy>().unwrap(), TtlStrategy::WeakTimeliness);
        assert!("hourly".parse::<TtlStrategy>().is_err());
    }
}
