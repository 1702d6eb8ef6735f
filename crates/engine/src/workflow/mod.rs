//! Workflow orchestrator.
//!
//! [`Workflow`] owns a storage backend, a clock and the engine
//! configuration. Its operations are split by concern:
//!
//! - `registry`: register, deactivate, look up and list boxes, expiry report
//! - `advance`: scan-driven advance and the unconditional reset to reception
//! - `assignment`: request, assign, confirm and return against a service
//! - `history`: the log of a box with actor display names

mod advance;
mod assignment;
mod history;
mod registry;

#[cfg(test)]
mod tests;

pub use advance::{AdvanceOutcome, AdvanceRequest};
pub use assignment::ReturnOutcome;
pub use history::{HistoryEntry, UNKNOWN_ACTOR};

use steriflow_storage::WorkflowStorage;

use crate::clock::{Clock, SystemClock};
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;

/// The sterilization workflow over a storage backend `S`.
pub struct Workflow<S, C = SystemClock> {
    storage: S,
    clock: C,
    config: WorkflowConfig,
}

impl<S: WorkflowStorage> Workflow<S, SystemClock> {
    /// A workflow reading the system clock, with default configuration.
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, SystemClock)
    }
}

impl<S: WorkflowStorage, C: Clock> Workflow<S, C> {
    pub fn with_clock(storage: S, clock: C) -> Self {
        Self {
            storage,
            clock,
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Commit `snapshot` if `result` is Ok, abort it otherwise.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        result: Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        match result {
            Ok(value) => match self.storage.commit_snapshot(snapshot).await {
                Ok(()) => Ok(value),
                Err(e) => Err(log_failure(WorkflowError::from(e))),
            },
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(log_failure(e))
            }
        }
    }
}

fn log_failure(e: WorkflowError) -> WorkflowError {
    match &e {
        WorkflowError::StaleState { box_id, .. } => {
            tracing::warn!(box_id = %box_id, "{e}");
        }
        WorkflowError::Persistence(_) => tracing::error!("{e}"),
        _ => tracing::debug!(kind = e.kind(), "{e}"),
    }
    e
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Trimmed, non-empty value of a required text input.
fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::InvalidInput(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed)
}

/// Trimmed value of an optional text input; blank becomes `None`.
fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
