/// All errors that can be returned by a WorkflowStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict -- another transaction modified
    /// the box concurrently. The expected version was not found.
    #[error("concurrent conflict on box {box_id}: expected version {expected_version}")]
    ConcurrentConflict { box_id: String, expected_version: u64 },

    /// No box with the given id (or no active box with the given code).
    #[error("box not found: {key}")]
    BoxNotFound { key: String },

    /// No assignment with the given id.
    #[error("assignment not found: {assignment_id}")]
    AssignmentNotFound { assignment_id: String },

    /// An active box already uses this code.
    #[error("an active box already uses code {code}")]
    DuplicateBoxCode { code: String },

    /// A record with this primary key already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// A backend-specific storage error (I/O, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
