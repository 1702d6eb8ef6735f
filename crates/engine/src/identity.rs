//! Who is performing an operation.
//!
//! The engine records actor ids verbatim. Resolving them (CLI flag,
//! configuration, HTTP header) is the caller's job; this trait is the seam.

use crate::error::WorkflowError;

/// Source of the current actor id.
pub trait IdentityContext: Send + Sync {
    fn current_actor_id(&self) -> Option<String>;

    /// The current actor id, or `InvalidInput` if none is known.
    fn require_actor(&self) -> Result<String, WorkflowError> {
        self.current_actor_id()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                WorkflowError::InvalidInput("no current actor id is available".to_string())
            })
    }
}

/// An identity fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    actor_id: Option<String>,
}

impl StaticIdentity {
    pub fn new(actor_id: Option<String>) -> Self {
        Self { actor_id }
    }
}

impl IdentityContext for StaticIdentity {
    fn current_actor_id(&self) -> Option<String> {
        self.actor_id.clone()
    }
}
