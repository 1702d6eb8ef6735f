use async_trait::async_trait;
use steriflow_core::{BoxAssignment, BoxCode, InstrumentBox, Profile, WorkflowLogEntry};

use crate::error::StorageError;

/// The record store behind the sterilization workflow.
///
/// A `WorkflowStorage` implementation provides durable, transactional storage
/// for instrument boxes, the workflow log, box assignments and actor profiles.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` -- start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` -- commit and consume the transaction
///    OR `abort_snapshot(snapshot)` -- roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, its writes MUST be
/// discarded. Reads through `*_for_update` methods see the snapshot's own
/// uncommitted writes; the query methods only ever see committed data.
///
/// ## OCC Conflict Detection
///
/// `update_box` performs an optimistic concurrency check: the write applies
/// only if the stored box is still at `expected_version`. Otherwise the method
/// (or the later commit, if the race is lost after the update was staged)
/// returns `Err(StorageError::ConcurrentConflict { .. })`.
///
/// ## Audit Coupling
///
/// A box update and the log entry describing it must be written in the SAME
/// snapshot. This is what guarantees that the log never records a transition
/// the box did not make, and that no transition goes unlogged.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait WorkflowStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable and visible at once.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Box registry (within snapshot) ───────────────────────────────────────

    /// Insert a newly registered box.
    ///
    /// Returns `Err(StorageError::DuplicateBoxCode)` if an active box already
    /// uses the code and `Err(StorageError::AlreadyExists)` if the id is taken.
    async fn insert_box(
        &self,
        snapshot: &mut Self::Snapshot,
        record: InstrumentBox,
    ) -> Result<(), StorageError>;

    /// Read a box by id for a subsequent conditional update.
    ///
    /// Returns `Err(StorageError::BoxNotFound)` if the box does not exist.
    async fn get_box_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        box_id: &str,
    ) -> Result<InstrumentBox, StorageError>;

    /// Read the ACTIVE box carrying `code` for a subsequent conditional update.
    ///
    /// Returns `Err(StorageError::BoxNotFound)` if no active box matches.
    async fn get_box_by_code_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        code: &BoxCode,
    ) -> Result<InstrumentBox, StorageError>;

    /// Replace the mutable fields of a box, conditional on its version (OCC).
    ///
    /// The stored version becomes `expected_version + 1`; the `version` field
    /// of `record` is ignored. Returns the new version number on success.
    async fn update_box(
        &self,
        snapshot: &mut Self::Snapshot,
        record: &InstrumentBox,
        expected_version: u64,
    ) -> Result<u64, StorageError>;

    // ── Workflow log (within snapshot) ────────────────────────────────────────

    /// Append a log entry. The store assigns `sequence`; the stored entry is
    /// returned. Entries are never updated or removed.
    async fn append_log_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: WorkflowLogEntry,
    ) -> Result<WorkflowLogEntry, StorageError>;

    // ── Assignments (within snapshot) ─────────────────────────────────────────

    /// Insert a new assignment.
    async fn insert_assignment(
        &self,
        snapshot: &mut Self::Snapshot,
        record: BoxAssignment,
    ) -> Result<(), StorageError>;

    /// Read an assignment by id.
    ///
    /// Returns `Err(StorageError::AssignmentNotFound)` if it does not exist.
    async fn get_assignment_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        assignment_id: &str,
    ) -> Result<BoxAssignment, StorageError>;

    /// The assignment of `box_id` that is not yet returned, if any.
    async fn find_open_assignment_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        box_id: &str,
    ) -> Result<Option<BoxAssignment>, StorageError>;

    /// Replace an existing assignment.
    async fn update_assignment(
        &self,
        snapshot: &mut Self::Snapshot,
        record: &BoxAssignment,
    ) -> Result<(), StorageError>;

    // ── Profiles (within snapshot) ────────────────────────────────────────────

    /// Insert or replace the display name of an actor.
    async fn upsert_profile(
        &self,
        snapshot: &mut Self::Snapshot,
        profile: Profile,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot, committed data only) ─────────────

    /// Read a box by id, active or not.
    async fn get_box(&self, box_id: &str) -> Result<InstrumentBox, StorageError>;

    /// Read the active box carrying `code`.
    async fn get_box_by_code(&self, code: &BoxCode) -> Result<InstrumentBox, StorageError>;

    /// List boxes ordered by code. Deactivated boxes are skipped unless
    /// `include_inactive` is set.
    async fn list_boxes(&self, include_inactive: bool)
        -> Result<Vec<InstrumentBox>, StorageError>;

    /// Log entries of a box, newest first (`created_at`, then `sequence`).
    ///
    /// `limit` caps the number of entries; 0 means no limit.
    async fn list_log_entries(
        &self,
        box_id: &str,
        limit: usize,
    ) -> Result<Vec<WorkflowLogEntry>, StorageError>;

    /// Read an assignment by id.
    async fn get_assignment(&self, assignment_id: &str) -> Result<BoxAssignment, StorageError>;

    /// All assignments of a box, oldest request first.
    async fn list_assignments(&self, box_id: &str) -> Result<Vec<BoxAssignment>, StorageError>;

    /// Batch profile lookup. Unknown ids are simply absent from the result.
    async fn get_profiles(&self, actor_ids: &[String]) -> Result<Vec<Profile>, StorageError>;
}
