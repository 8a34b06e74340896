//! Operations Module
//!
//! Whole-store procedures that run on top of the entry store: diagnostics
//! and self-healing, load benchmarks, integrity scans, backup and restore.

mod backup;
mod benchmark;
mod diagnostics;
mod integrity;

pub use backup::{
    create_backup, restore_from_backup, BackupMetadata, BackupOptions, BackupResult,
    RestoreFailure, RestoreOptions, RestoreResult,
};
pub use benchmark::{
    run_benchmark, BenchOp, BenchmarkOptions, BenchmarkResult, BenchmarkScenario,
    LatencyDistribution, OperationBreakdown, ResourceSample, WeightedOp, BENCH_PREFIX,
};
pub use diagnostics::{
    attempt_self_healing, run_diagnostics, CheckStatus, DiagnosticCheck, DiagnosticIssue,
    DiagnosticsResult, FixAttempt, IssueCategory, SelfHealingResult,
};
pub use integrity::{
    validate_data_integrity, IntegrityCheckOptions, IntegrityCheckResult, IntegrityDepth,
    IntegrityIssue, IssueKind, DEPENDS_ON_TAG,
};
