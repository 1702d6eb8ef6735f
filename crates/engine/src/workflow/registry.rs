use steriflow_core::{BoxCode, BoxStatus, InstrumentBox, Profile, SterilizationType};
use steriflow_storage::WorkflowStorage;
use time::Duration;

use super::{new_id, required, Workflow};
use crate::clock::Clock;
use crate::error::WorkflowError;

impl<S: WorkflowStorage, C: Clock> Workflow<S, C> {
    /// Register a new box. It starts outside the cycle (no step, dirty).
    ///
    /// A blank name falls back to the code.
    pub async fn register_box(
        &self,
        code: &str,
        name: &str,
        sterilization_type: Option<SterilizationType>,
    ) -> Result<InstrumentBox, WorkflowError> {
        let code = BoxCode::normalize(code)?;
        let name = match name.trim() {
            "" => code.to_string(),
            trimmed => trimmed.to_string(),
        };
        let record = InstrumentBox::new(new_id(), code, name, sterilization_type, self.clock.now());

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = self
            .storage
            .insert_box(&mut snapshot, record.clone())
            .await
            .map_err(WorkflowError::from);
        self.finish(snapshot, result).await?;

        tracing::info!(box_id = %record.id, box_code = %record.code, "box registered");
        Ok(record)
    }

    /// Soft-delete a box. Its log stays; its code becomes free again.
    pub async fn deactivate_box(&self, box_id: &str) -> Result<InstrumentBox, WorkflowError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let result: Result<InstrumentBox, WorkflowError> = async {
            let mut record = self.active_box_for_update(&mut snapshot, box_id).await?;
            if let Some(open) = self
                .storage
                .find_open_assignment_for_update(&mut snapshot, &record.id)
                .await?
            {
                return Err(WorkflowError::Conflict(format!(
                    "box {} has an open {} assignment for {}",
                    record.code, open.status, open.service_id
                )));
            }
            let expected_version = record.version;
            record.active = false;
            record.updated_at = self.clock.now();
            record.version = self
                .storage
                .update_box(&mut snapshot, &record, expected_version)
                .await?;
            Ok(record)
        }
        .await;
        let record = self.finish(snapshot, result).await?;

        tracing::info!(box_id = %record.id, box_code = %record.code, "box deactivated");
        Ok(record)
    }

    /// The active box carrying `code` (trimmed, case-insensitive).
    pub async fn get_box(&self, code: &str) -> Result<InstrumentBox, WorkflowError> {
        let code = BoxCode::normalize(code)?;
        Ok(self.storage.get_box_by_code(&code).await?)
    }

    /// A box by id, active or not.
    pub async fn get_box_by_id(&self, box_id: &str) -> Result<InstrumentBox, WorkflowError> {
        Ok(self.storage.get_box(box_id).await?)
    }

    /// Active boxes ordered by code, optionally only those with `status`.
    pub async fn list_boxes(
        &self,
        status: Option<BoxStatus>,
    ) -> Result<Vec<InstrumentBox>, WorkflowError> {
        let boxes = self.storage.list_boxes(false).await?;
        Ok(match status {
            Some(wanted) => boxes.into_iter().filter(|b| b.status() == wanted).collect(),
            None => boxes,
        })
    }

    /// Sterile boxes whose validity ends at or before `now + within`,
    /// soonest first. Already expired boxes are included.
    pub async fn expiring_boxes(
        &self,
        within: Duration,
    ) -> Result<Vec<InstrumentBox>, WorkflowError> {
        let horizon = self.clock.now().checked_add(within).ok_or_else(|| {
            WorkflowError::InvalidInput(format!(
                "expiry window of {} days is out of range",
                within.whole_days()
            ))
        })?;
        let mut boxes: Vec<InstrumentBox> = self
            .storage
            .list_boxes(false)
            .await?
            .into_iter()
            .filter(|b| b.status() == BoxStatus::Sterile)
            .filter(|b| b.next_sterilization_due.is_some_and(|due| due <= horizon))
            .collect();
        boxes.sort_by_key(|b| b.next_sterilization_due);
        Ok(boxes)
    }

    /// Record or rename the display name of an operator.
    pub async fn add_operator(
        &self,
        actor_id: &str,
        full_name: &str,
    ) -> Result<Profile, WorkflowError> {
        let profile = Profile {
            actor_id: required("actor id", actor_id)?.to_string(),
            full_name: required("full name", full_name)?.to_string(),
        };

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = self
            .storage
            .upsert_profile(&mut snapshot, profile.clone())
            .await
            .map_err(WorkflowError::from);
        self.finish(snapshot, result).await?;

        tracing::info!(actor_id = %profile.actor_id, "operator profile saved");
        Ok(profile)
    }
}
