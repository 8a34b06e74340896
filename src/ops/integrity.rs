//! Integrity Checker
//!
//! Scans stored entries for corruption, expiry inconsistencies and orphaned
//! references, optionally repairing what it finds.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{compression, estimate_size, validate_key, CacheEntry, EntryStore, KeyPattern};
use crate::config::CacheConfiguration;
use crate::error::{ErrorSeverity, Result};
use crate::events::{CacheModuleEvent, EventSeverity, EventType};

/// Tag naming the key an entry was derived from.
pub const DEPENDS_ON_TAG: &str = "depends_on";

// == Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityDepth {
    /// Key format only
    Shallow,
    /// Also decode and verify payloads
    Deep,
    /// Also cross-check expiry and tag references
    Comprehensive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityCheckOptions {
    pub depth: IntegrityDepth,
    pub pattern: Option<String>,
    /// Maximum number of scan tasks running at once
    pub concurrency_limit: usize,
    pub auto_fix: bool,
    pub timeout_ms: Option<u64>,
}

impl Default for IntegrityCheckOptions {
    fn default() -> Self {
        Self {
            depth: IntegrityDepth::Deep,
            pattern: None,
            concurrency_limit: 4,
            auto_fix: false,
            timeout_ms: None,
        }
    }
}

// == Result ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Corruption,
    Expiry,
    Orphan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repair {
    Remove,
    /// Reset the expiry to `now + seconds`
    Expire(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub key: String,
    pub kind: IssueKind,
    pub severity: ErrorSeverity,
    pub description: String,
    pub fixed: bool,
    #[serde(skip)]
    repair: Option<Repair>,
    #[serde(skip)]
    created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityCheckResult {
    pub keys_checked: usize,
    pub issues_found: usize,
    /// Always equals the number of issues with `fixed == true`
    pub issues_fixed: usize,
    pub issues: Vec<IntegrityIssue>,
    pub data_quality_score: u8,
    pub duration_ms: u64,
    pub partial: bool,
}

// == Validate ==
/// Validates every entry matching `options.pattern`, expired ones included.
pub async fn validate_data_integrity(
    store: Arc<EntryStore>,
    options: IntegrityCheckOptions,
    cancel: CancellationToken,
) -> Result<IntegrityCheckResult> {
    let started = Instant::now();
    let config = store.config();
    let now = store.now_ms();
    let pattern = options
        .pattern
        .as_deref()
        .map(KeyPattern::parse)
        .unwrap_or(KeyPattern::All);

    let mut entries: Vec<CacheEntry> = Vec::new();
    store.map().for_each_shard(|shard| {
        entries.extend(shard.iter().filter(|e| pattern.matches(&e.key)).cloned());
    });
    let keys_checked = entries.len();

    let live: Arc<HashSet<String>> = Arc::new(if options.depth == IntegrityDepth::Comprehensive {
        store.keys(None).into_iter().collect()
    } else {
        HashSet::new()
    });

    let workers = options.concurrency_limit.max(1);
    let chunk_size = entries.len().div_ceil(workers).max(1);
    let mut tasks = JoinSet::new();
    let mut chunks = Vec::new();
    while !entries.is_empty() {
        let rest = entries.split_off(chunk_size.min(entries.len()));
        chunks.push(std::mem::replace(&mut entries, rest));
    }
    for chunk in chunks {
        let config = config.clone();
        let live = live.clone();
        let cancel = cancel.clone();
        let depth = options.depth;
        tasks.spawn_blocking(move || {
            let mut issues = Vec::new();
            for entry in &chunk {
                if cancel.is_cancelled() {
                    break;
                }
                inspect(entry, depth, &config, &live, now, &mut issues);
            }
            issues
        });
    }

    let timeout_ms = options
        .timeout_ms
        .unwrap_or(config.performance.operation_timeout_ms);
    let timeout = Duration::from_millis(timeout_ms);
    let mut issues = Vec::new();
    let mut partial = false;
    let collect = async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(found) => issues.extend(found),
                Err(e) => warn!("integrity scan task failed: {}", e),
            }
        }
    };
    if tokio::time::timeout(timeout, collect).await.is_err() {
        cancel.cancel();
        partial = true;
    }
    partial |= cancel.is_cancelled();

    if options.auto_fix {
        for issue in issues.iter_mut() {
            issue.fixed = apply_repair(&store, issue);
        }
    }

    let corrupt = issues.iter().filter(|i| i.kind == IssueKind::Corruption).count();
    if corrupt > 0 {
        let unrepaired = issues
            .iter()
            .filter(|i| i.kind == IssueKind::Corruption && !i.fixed)
            .count();
        let mut event = CacheModuleEvent::new(
            EventType::DataCorruption,
            store.events().source(),
            EventSeverity::Error,
            json!({
                "corrupted_entries": corrupt,
                "unrepaired_entries": unrepaired,
                "keys_checked": keys_checked,
            }),
        );
        if unrepaired > 0 {
            event = event.requiring_response();
        }
        store.events().publish(event);
    }

    let issues_found = issues.len();
    let issues_fixed = issues.iter().filter(|i| i.fixed).count();
    let data_quality_score = if issues_found == 0 {
        100
    } else {
        (100.0 * issues_fixed as f64 / issues_found as f64).round() as u8
    };
    info!(
        "Integrity check: {} keys, {} issues, {} fixed{}",
        keys_checked,
        issues_found,
        issues_fixed,
        if partial { " (partial)" } else { "" }
    );

    Ok(IntegrityCheckResult {
        keys_checked,
        issues_found,
        issues_fixed,
        issues,
        data_quality_score,
        duration_ms: started.elapsed().as_millis() as u64,
        partial,
    })
}

fn issue(
    entry: &CacheEntry,
    kind: IssueKind,
    severity: ErrorSeverity,
    description: String,
    repair: Option<Repair>,
) -> IntegrityIssue {
    IntegrityIssue {
        key: entry.key.clone(),
        kind,
        severity,
        description,
        fixed: false,
        repair,
        created_at: entry.created_at,
    }
}

fn inspect(
    entry: &CacheEntry,
    depth: IntegrityDepth,
    config: &CacheConfiguration,
    live: &HashSet<String>,
    now: u64,
    issues: &mut Vec<IntegrityIssue>,
) {
    if let Err(e) = validate_key(&entry.key, config) {
        issues.push(issue(
            entry,
            IssueKind::Corruption,
            ErrorSeverity::Medium,
            e.to_string(),
            Some(Repair::Remove),
        ));
        return;
    }
    if entry.key.chars().any(char::is_control) {
        issues.push(issue(
            entry,
            IssueKind::Corruption,
            ErrorSeverity::Medium,
            "key contains control characters".into(),
            Some(Repair::Remove),
        ));
        return;
    }
    if depth == IntegrityDepth::Shallow {
        return;
    }

    if entry.size_bytes != estimate_size(&entry.key, entry.value.len(), &entry.tags) {
        issues.push(issue(
            entry,
            IssueKind::Corruption,
            ErrorSeverity::High,
            format!("accounted size {} does not match contents", entry.size_bytes),
            Some(Repair::Remove),
        ));
        return;
    }
    if let Err(e) = compression::expand(&entry.value, entry.compressed) {
        issues.push(issue(
            entry,
            IssueKind::Corruption,
            ErrorSeverity::Critical,
            e.to_string(),
            Some(Repair::Remove),
        ));
        return;
    }
    if depth == IntegrityDepth::Deep {
        return;
    }

    match entry.expires_at {
        None => issues.push(issue(
            entry,
            IssueKind::Expiry,
            ErrorSeverity::Medium,
            "entry has no expiry".into(),
            Some(Repair::Expire(config.ttl.default_ttl)),
        )),
        Some(at) if at <= now => issues.push(issue(
            entry,
            IssueKind::Expiry,
            ErrorSeverity::Low,
            "expired entry still stored".into(),
            Some(Repair::Remove),
        )),
        Some(at) if at > entry.created_at + config.ttl.max_ttl * 1000 => issues.push(issue(
            entry,
            IssueKind::Expiry,
            ErrorSeverity::Medium,
            format!("expiry exceeds max_ttl of {} s", config.ttl.max_ttl),
            Some(Repair::Expire(config.ttl.max_ttl)),
        )),
        Some(_) => {}
    }

    if let Some(parent) = entry.tags.get(DEPENDS_ON_TAG) {
        if !live.contains(parent) {
            issues.push(issue(
                entry,
                IssueKind::Orphan,
                ErrorSeverity::Low,
                format!("depends on missing key '{}'", parent),
                Some(Repair::Remove),
            ));
        }
    }
}

/// Applies the issue's repair if the entry is unchanged since the scan.
fn apply_repair(store: &EntryStore, issue: &IntegrityIssue) -> bool {
    let Some(repair) = issue.repair else {
        return false;
    };
    let now = store.now_ms();
    store.map().write(&issue.key, |shard| {
        let current = match shard.get(&issue.key) {
            Some(e) if e.created_at == issue.created_at => e,
            _ => return false,
        };
        match repair {
            Repair::Remove => shard.remove(&issue.key).is_some(),
            Repair::Expire(seconds) => {
                let replacement = current.with_expiry(Some(now + seconds * 1000));
                shard.insert(replacement);
                true
            }
        }
    })
}
