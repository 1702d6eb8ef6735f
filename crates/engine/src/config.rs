use serde::{Deserialize, Serialize};

/// Upper bound for `sterile_validity_days`: ten years.
pub const MAX_STERILE_VALIDITY_DAYS: u32 = 3650;

/// Tunables of the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Days a sterilized box stays valid after entering storage.
    pub sterile_validity_days: u32,
    /// Log entries returned by a history query when no limit is given.
    pub history_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            sterile_validity_days: 30,
            history_limit: 20,
        }
    }
}

impl WorkflowConfig {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.sterile_validity_days == 0 {
            return Err("workflow.sterile_validity_days must be at least 1".to_string());
        }
        if self.sterile_validity_days > MAX_STERILE_VALIDITY_DAYS {
            return Err(format!(
                "workflow.sterile_validity_days must be at most {MAX_STERILE_VALIDITY_DAYS}"
            ));
        }
        if self.history_limit == 0 {
            return Err("workflow.history_limit must be at least 1".to_string());
        }
        Ok(())
    }
}
