use steriflow_core::{RuleError, Step};
use steriflow_storage::StorageError;

/// Errors surfaced by workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// No active box with this code, or no record with this id.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Leaving sterilization requires a control result.
    #[error("a control result (passed or failed) is required to leave the {step} step")]
    ValidationRequired { step: Step },

    /// The box or assignment is not in a state that allows the operation.
    #[error("{0}")]
    Conflict(String),

    /// The box changed since it was read. Reload it and retry.
    #[error("box {box_id} was modified concurrently (expected version {expected_version})")]
    StaleState { box_id: String, expected_version: u64 },

    /// Malformed or rejected input.
    #[error("{0}")]
    InvalidInput(String),

    /// The record store failed. Nothing was written.
    #[error("storage failure: {0}")]
    Persistence(#[source] StorageError),
}

impl WorkflowError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::ValidationRequired { .. } => "validation_required",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::StaleState { .. } => "stale_state",
            WorkflowError::InvalidInput(_) => "invalid_input",
            WorkflowError::Persistence(_) => "persistence",
        }
    }
}

impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ConcurrentConflict {
                box_id,
                expected_version,
            } => WorkflowError::StaleState {
                box_id,
                expected_version,
            },
            StorageError::BoxNotFound { key } => WorkflowError::NotFound { kind: "box", key },
            StorageError::AssignmentNotFound { assignment_id } => WorkflowError::NotFound {
                kind: "assignment",
                key: assignment_id,
            },
            StorageError::DuplicateBoxCode { code } => {
                WorkflowError::InvalidInput(format!("an active box already uses code {code}"))
            }
            other => WorkflowError::Persistence(other),
        }
    }
}

impl From<RuleError> for WorkflowError {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::ValidationRequired { step } => WorkflowError::ValidationRequired { step },
            other => WorkflowError::InvalidInput(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_conflict_becomes_stale_state() {
        let err = WorkflowError::from(StorageError::ConcurrentConflict {
            box_id: "b1".to_string(),
            expected_version: 3,
        });
        assert_eq!(err.kind(), "stale_state");
        assert!(err.to_string().contains("expected version 3"));
    }

    #[test]
    fn backend_failure_becomes_persistence() {
        let err = WorkflowError::from(StorageError::Backend("disk full".to_string()));
        assert_eq!(err.kind(), "persistence");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn duplicate_code_is_invalid_input() {
        let err = WorkflowError::from(StorageError::DuplicateBoxCode {
            code: "ORTHO-1".to_string(),
        });
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn rule_errors_map_to_taxonomy() {
        let err = WorkflowError::from(RuleError::ValidationRequired {
            step: Step::Sterilization,
        });
        assert_eq!(err.kind(), "validation_required");
        assert_eq!(
            WorkflowError::from(RuleError::EmptyBoxCode).kind(),
            "invalid_input"
        );
    }
}
