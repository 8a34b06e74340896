//! Diagnostics & Self-Healing
//!
//! Scores a fixed catalogue of checks against the monitor's figures and, on
//! request, applies a fixed catalogue of remediations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::cache::{purge_expired, run_cleanup_cycle, EntryStore, StoreUsage};
use crate::config::CacheConfiguration;
use crate::error::ErrorSeverity;
use crate::events::{EventSeverity, EventType};

/// Operations needed before the hit-rate check is meaningful.
const MIN_OPS_FOR_HIT_RATE: u64 = 100;

// == Result Types ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Connection,
    Memory,
    Errors,
    Configuration,
    Performance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: CheckStatus,
    pub score: u8,
    pub message: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticIssue {
    pub severity: ErrorSeverity,
    pub category: IssueCategory,
    pub description: String,
    pub impact: String,
    pub solution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsResult {
    /// Never above the worst individual check score
    pub overall_health_score: u8,
    pub checks: Vec<DiagnosticCheck>,
    /// Most severe first
    pub issues: Vec<DiagnosticIssue>,
    pub performance_recommendations: Option<Vec<String>>,
    pub configuration_recommendations: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticsResult {
    pub fn has_issue(&self, category: IssueCategory) -> bool {
        self.issues.iter().any(|i| i.category == category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAttempt {
    pub issue: String,
    pub action: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealingResult {
    pub attempted_fixes: usize,
    pub successful_fixes: usize,
    pub fixes: Vec<FixAttempt>,
    pub remaining_issues: Vec<String>,
}

// == Checks ==
struct Check {
    category: IssueCategory,
    weight: f64,
    result: DiagnosticCheck,
    impact: &'static str,
}

/// Maps a position inside a status band onto the band's score range:
/// pass 80–100, warn 50–79, fail 0–49. `quality` is in [0, 1].
fn band_score(status: CheckStatus, quality: f64) -> u8 {
    let q = quality.clamp(0.0, 1.0);
    let (lo, hi) = match status {
        CheckStatus::Pass => (80.0, 100.0),
        CheckStatus::Warn => (50.0, 79.0),
        CheckStatus::Fail => (0.0, 49.0),
    };
    (lo + (hi - lo) * q).round() as u8
}

fn check(name: &str, status: CheckStatus, quality: f64, message: String, recommendation: Option<&str>) -> DiagnosticCheck {
    DiagnosticCheck {
        name: name.to_string(),
        status,
        score: band_score(status, quality),
        message,
        recommendation: recommendation.map(str::to_string),
    }
}

fn connection_check(initialized: bool) -> Check {
    let result = if initialized {
        check("connection", CheckStatus::Pass, 1.0, "store reachable".into(), None)
    } else {
        check(
            "connection",
            CheckStatus::Fail,
            0.0,
            "module not initialized".into(),
            Some("initialize the module before serving traffic"),
        )
    };
    Check {
        category: IssueCategory::Connection,
        weight: 3.0,
        result,
        impact: "all cache operations fail",
    }
}

fn memory_check(usage: &StoreUsage, config: &CacheConfiguration) -> Check {
    let ratio = usage.memory_ratio();
    let threshold = config.limits.memory_threshold_ratio;
    let message = format!(
        "memory at {:.1}% of budget (threshold {:.1}%)",
        ratio * 100.0,
        threshold * 100.0
    );
    let result = if ratio > threshold {
        check(
            "memory_pressure",
            CheckStatus::Fail,
            1.0 - ratio,
            message,
            Some("raise max_memory_bytes or lower TTLs"),
        )
    } else if ratio > threshold * 0.8 {
        check(
            "memory_pressure",
            CheckStatus::Warn,
            (threshold - ratio) / (threshold * 0.2),
            message,
            Some("watch memory growth; eviction will start soon"),
        )
    } else {
        check("memory_pressure", CheckStatus::Pass, 1.0 - ratio / threshold, message, None)
    };
    Check {
        category: IssueCategory::Memory,
        weight: 2.0,
        result,
        impact: "entries are evicted early and writes may be rejected",
    }
}

fn error_rate_check(error_rate: f64, config: &CacheConfiguration) -> Check {
    let alert = config.limits.error_rate_alert_threshold;
    let message = format!("error rate {:.2}% (alert at {:.2}%)", error_rate * 100.0, alert * 100.0);
    let result = if error_rate > alert {
        check(
            "error_rate",
            CheckStatus::Fail,
            1.0 - error_rate,
            message,
            Some("inspect recent errors by kind"),
        )
    } else if error_rate > alert / 2.0 {
        check(
            "error_rate",
            CheckStatus::Warn,
            (alert - error_rate) / (alert / 2.0),
            message,
            Some("inspect recent errors by kind"),
        )
    } else {
        let quality = if alert > 0.0 { 1.0 - error_rate / alert } else { 1.0 };
        check("error_rate", CheckStatus::Pass, quality, message, None)
    };
    Check {
        category: IssueCategory::Errors,
        weight: 2.0,
        result,
        impact: "callers see failed cache operations",
    }
}

/// Valid but questionable settings.
fn configuration_warnings(config: &CacheConfiguration) -> Vec<String> {
    let ttl = &config.ttl;
    let mut warnings = Vec::new();
    if ttl.real_time_ttl > ttl.near_real_time_ttl {
        warnings.push("real_time_ttl exceeds near_real_time_ttl".to_string());
    }
    if ttl.near_real_time_ttl > ttl.batch_ttl {
        warnings.push("near_real_time_ttl exceeds batch_ttl".to_string());
    }
    if config.limits.memory_threshold_ratio > 0.95 {
        warnings.push("memory_threshold_ratio above 0.95 leaves no eviction headroom".to_string());
    }
    if config.intervals.cleanup_interval_ms > 60_000 {
        warnings.push("cleanup_interval_ms above one minute lets expired entries linger".to_string());
    }
    warnings
}

fn configuration_check(config: &CacheConfiguration) -> Check {
    let result = match config.validate() {
        Err(e) => check(
            "configuration",
            CheckStatus::Fail,
            0.0,
            e.to_string(),
            Some("reapply the last known good configuration"),
        ),
        Ok(()) => {
            let warnings = configuration_warnings(config);
            if warnings.is_empty() {
                check("configuration", CheckStatus::Pass, 1.0, "configuration is consistent".into(), None)
            } else {
                check(
                    "configuration",
                    CheckStatus::Warn,
                    1.0 - warnings.len() as f64 / 4.0,
                    warnings.join("; "),
                    Some("review TTL tiers and thresholds"),
                )
            }
        }
    };
    Check {
        category: IssueCategory::Configuration,
        weight: 1.0,
        result,
        impact: "TTLs or thresholds do not match the intended policy",
    }
}

fn hit_rate_check(store: &EntryStore) -> Check {
    let monitor = store.monitor();
    let operations = monitor.total_operations();
    let hit_rate = monitor.hit_rate();
    let result = if operations < MIN_OPS_FOR_HIT_RATE {
        check(
            "hit_rate",
            CheckStatus::Pass,
            1.0,
            format!("only {} operations recorded", operations),
            None,
        )
    } else if hit_rate < 0.5 {
        check(
            "hit_rate",
            CheckStatus::Warn,
            hit_rate / 0.5,
            format!("hit rate {:.1}%", hit_rate * 100.0),
            Some("consider longer TTLs or the ADAPTIVE strategy"),
        )
    } else {
        check(
            "hit_rate",
            CheckStatus::Pass,
            (hit_rate - 0.5) / 0.5,
            format!("hit rate {:.1}%", hit_rate * 100.0),
            None,
        )
    };
    Check {
        category: IssueCategory::Performance,
        weight: 1.0,
        result,
        impact: "more requests fall through to the backing source",
    }
}

// == Run Diagnostics ==
/// Runs every check and builds a fresh report.
pub fn run_diagnostics(store: &EntryStore, initialized: bool) -> DiagnosticsResult {
    let config = store.config();
    let usage = store.usage();
    let error_rate = store.monitor().error_rate();

    let checks = vec![
        connection_check(initialized),
        memory_check(&usage, &config),
        error_rate_check(error_rate, &config),
        configuration_check(&config),
        hit_rate_check(store),
    ];

    let total_weight: f64 = checks.iter().map(|c| c.weight).sum();
    let weighted = checks
        .iter()
        .map(|c| c.weight * c.result.score as f64)
        .sum::<f64>()
        / total_weight;
    let worst = checks.iter().map(|c| c.result.score).min().unwrap_or(100);
    let overall_health_score = (weighted.round() as u8).min(worst);

    let mut issues: Vec<DiagnosticIssue> = checks
        .iter()
        .filter(|c| c.result.status != CheckStatus::Pass)
        .map(|c| DiagnosticIssue {
            severity: match (c.result.status, c.category) {
                (CheckStatus::Fail, IssueCategory::Connection) => ErrorSeverity::Critical,
                (CheckStatus::Fail, _) => ErrorSeverity::High,
                _ => ErrorSeverity::Medium,
            },
            category: c.category,
            description: format!("{}: {}", c.result.name, c.result.message),
            impact: c.impact.to_string(),
            solution: c
                .result
                .recommendation
                .clone()
                .unwrap_or_else(|| "no automatic remedy".to_string()),
        })
        .collect();
    issues.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut performance = Vec::new();
    if store.monitor().hit_rate() < 0.5 && store.monitor().total_operations() >= MIN_OPS_FOR_HIT_RATE {
        performance.push("raise TTLs for hot keys or switch them to the ADAPTIVE strategy".to_string());
    }
    let stats = store.monitor().stats(&usage, None);
    if stats.total_operations > 0 && stats.slow_operations * 10 > stats.total_operations {
        performance.push(format!(
            "{} of {} operations exceeded {} ms; enable compression only for large values",
            stats.slow_operations, stats.total_operations, config.performance.slow_operation_threshold_ms
        ));
    }
    let configuration = configuration_warnings(&config);

    if config.validate().is_ok() && configuration.is_empty() {
        store.config_handle().mark_known_good();
    }

    DiagnosticsResult {
        overall_health_score,
        checks: checks.into_iter().map(|c| c.result).collect(),
        issues,
        performance_recommendations: (!performance.is_empty()).then_some(performance),
        configuration_recommendations: (!configuration.is_empty()).then_some(configuration),
        timestamp: Utc::now(),
    }
}

// == Self-Healing ==
/// Diagnoses the module and applies the remediation catalogue in order:
/// purge expired entries, evict under memory pressure, reset error
/// counters, reapply the last known good configuration.
///
/// A failed remediation is recorded in the result, never raised.
pub fn attempt_self_healing(store: &EntryStore, initialized: bool) -> SelfHealingResult {
    let report = run_diagnostics(store, initialized);
    let mut fixes = Vec::new();
    let mut addressed = Vec::new();

    if report.has_issue(IssueCategory::Memory) {
        let removed = purge_expired(store, store.now_ms());
        store.monitor().record_cleanup(removed as u64);
        fixes.push(FixAttempt {
            issue: "memory_pressure".into(),
            action: "purge_expired".into(),
            success: true,
            message: format!("removed {} expired entries", removed),
        });

        let cleanup = run_cleanup_cycle(store);
        fixes.push(FixAttempt {
            issue: "memory_pressure".into(),
            action: "evict".into(),
            success: cleanup.threshold_met,
            message: format!(
                "evicted {} entries, utilization {:.1}%",
                cleanup.evicted,
                cleanup.utilization_after * 100.0
            ),
        });
        if cleanup.threshold_met {
            addressed.push(IssueCategory::Memory);
        }
    }

    if report.has_issue(IssueCategory::Errors) {
        store.monitor().reset_errors();
        fixes.push(FixAttempt {
            issue: "error_rate".into(),
            action: "reset_error_counters".into(),
            success: true,
            message: "error counters cleared".into(),
        });
        addressed.push(IssueCategory::Errors);
    }

    if report.has_issue(IssueCategory::Configuration) {
        let handle = store.config_handle();
        handle.restore_last_known_good();
        let restored = handle.load();
        let success = restored.validate().is_ok() && configuration_warnings(&restored).is_empty();
        store.events().emit(
            EventType::ConfigChange,
            EventSeverity::Warn,
            json!({ "reason": "self_healing", "action": "reapply_last_known_good" }),
        );
        fixes.push(FixAttempt {
            issue: "configuration".into(),
            action: "reapply_last_known_good".into(),
            success,
            message: if success {
                "last known good configuration reapplied".into()
            } else {
                "last known good configuration still has warnings".into()
            },
        });
        if success {
            addressed.push(IssueCategory::Configuration);
        }
    }

    let remaining_issues = report
        .issues
        .iter()
        .filter(|i| !addressed.contains(&i.category))
        .map(|i| i.description.clone())
        .collect();

    let successful_fixes = fixes.iter().filter(|f| f.success).count();
    if fixes.is_empty() {
        info!("Self-healing: nothing to fix");
    } else if successful_fixes < fixes.len() {
        warn!("Self-healing: {}/{} fixes succeeded", successful_fixes, fixes.len());
    } else {
        info!("Self-healing: applied {} fixes", fixes.len());
    }

    SelfHealingResult {
        attempted_fixes: fixes.len(),
        successful_fixes,
        fixes,
        remaining_issues,
    }
}
