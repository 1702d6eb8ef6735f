//! Conformance test suite for `WorkflowStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `WorkflowStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Registration**: box insertion, id and active-code uniqueness
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: a box update and its log entry land together or not at all
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Workflow log**: ordering, limits, append-only sequencing
//! - **Assignments and profiles**: open-assignment lookup, batch profile reads
//! - **Error handling**: correct error variants for invalid operations
//! - **Concurrency**: racing tasks against one box
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use steriflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod assignment;
mod commit;
mod concurrent;
mod error;
mod log;
mod register;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use steriflow_core::{
    AssignmentStatus, BoxAssignment, BoxCode, InstrumentBox, Step, WorkflowLogEntry,
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::WorkflowStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "register", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "inserted_box_starts_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(register::run_register_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(log::run_log_tests(&factory).await);
    results.extend(assignment::run_assignment_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

const T0: OffsetDateTime = datetime!(2025-01-01 08:00 UTC);

/// Suite codes are non-empty literals.
fn code(raw: &str) -> BoxCode {
    BoxCode::normalize(raw).expect("conformance box code")
}

fn make_box(id: &str, raw_code: &str) -> InstrumentBox {
    InstrumentBox::new(
        id.to_string(),
        code(raw_code),
        format!("Set {raw_code}"),
        None,
        T0,
    )
}

fn make_log_entry(
    id: &str,
    box_id: &str,
    from_step: Option<Step>,
    to_step: Step,
    minutes: i64,
) -> WorkflowLogEntry {
    WorkflowLogEntry {
        id: id.to_string(),
        box_id: box_id.to_string(),
        from_step,
        to_step,
        performed_by: "actor-1".to_string(),
        sterilization_type: None,
        validation_result: None,
        notes: None,
        created_at: T0 + Duration::minutes(minutes),
        sequence: 0,
    }
}

fn make_assignment(id: &str, box_id: &str, service_id: &str, minutes: i64) -> BoxAssignment {
    BoxAssignment {
        id: id.to_string(),
        box_id: box_id.to_string(),
        service_id: service_id.to_string(),
        bloc: None,
        status: AssignmentStatus::Assigned,
        requested_at: T0 + Duration::minutes(minutes),
        assigned_at: Some(T0 + Duration::minutes(minutes)),
        in_use_at: None,
        returned_at: None,
        requested_by: "actor-1".to_string(),
        assigned_by: Some("actor-1".to_string()),
        returned_by: None,
    }
}

/// Insert `record` in its own snapshot and commit it.
async fn seed_box<S: WorkflowStorage>(storage: &S, record: InstrumentBox) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_box(&mut snap, record)
        .await
        .map_err(|e| format!("insert_box: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}

/// Move a committed box to `step` in its own snapshot. Returns the new version.
async fn commit_step<S: WorkflowStorage>(
    storage: &S,
    box_id: &str,
    step: Step,
) -> Result<u64, String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut record = storage
        .get_box_for_update(&mut snap, box_id)
        .await
        .map_err(|e| format!("get_box_for_update: {e}"))?;
    let expected = record.version;
    record.current_step = Some(step);
    let v = storage
        .update_box(&mut snap, &record, expected)
        .await
        .map_err(|e| format!("update_box: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(v)
}
