use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use steriflow_core::WorkflowLogEntry;
use steriflow_storage::WorkflowStorage;

use super::Workflow;
use crate::clock::Clock;
use crate::error::WorkflowError;

/// Display name used when an actor has no profile or the lookup failed.
pub const UNKNOWN_ACTOR: &str = "Unknown";

/// A log entry with the display name of whoever performed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub entry: WorkflowLogEntry,
    pub actor_name: String,
}

impl<S: WorkflowStorage, C: Clock> Workflow<S, C> {
    /// The most recent log entries of a box, newest first.
    ///
    /// `limit` defaults to the configured history limit; zero is rejected.
    /// Actor names come from one batch profile lookup; if that lookup fails
    /// the names degrade to [`UNKNOWN_ACTOR`] and the history is still
    /// returned.
    pub async fn history(
        &self,
        box_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, WorkflowError> {
        let limit = limit.unwrap_or(self.config.history_limit);
        if limit == 0 {
            return Err(WorkflowError::InvalidInput(
                "history limit must be at least 1".to_string(),
            ));
        }
        self.storage.get_box(box_id).await?;
        let entries = self.storage.list_log_entries(box_id, limit).await?;

        let actor_ids: Vec<String> = entries
            .iter()
            .map(|e| e.performed_by.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names: HashMap<String, String> = if actor_ids.is_empty() {
            HashMap::new()
        } else {
            match self.storage.get_profiles(&actor_ids).await {
                Ok(profiles) => profiles
                    .into_iter()
                    .map(|p| (p.actor_id, p.full_name))
                    .collect(),
                Err(e) => {
                    tracing::warn!(box_id, error = %e, "profile lookup failed; showing unknown actors");
                    HashMap::new()
                }
            }
        };

        Ok(entries
            .into_iter()
            .map(|entry| {
                let actor_name = names
                    .get(&entry.performed_by)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_ACTOR.to_string());
                HistoryEntry { entry, actor_name }
            })
            .collect())
    }
}
