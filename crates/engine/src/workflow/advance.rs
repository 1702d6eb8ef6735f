//! Scan-driven advance and reset to reception.

use serde::{Deserialize, Serialize};
use steriflow_core::{
    plan_reset, plan_transition, AssignmentStatus, BoxCode, InstrumentBox, SterilizationType,
    TransitionPlan, ValidationResult, WorkflowLogEntry,
};
use steriflow_storage::WorkflowStorage;
use time::Duration;

use super::{new_id, optional, required, Workflow};
use crate::clock::Clock;
use crate::error::WorkflowError;

/// Inputs of an advance besides the box code and the actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdvanceRequest {
    /// Control result; required when leaving sterilization, ignored elsewhere.
    pub validation_result: Option<ValidationResult>,
    /// Method used; recorded on the box and the log entry when given.
    pub sterilization_type: Option<SterilizationType>,
    pub notes: Option<String>,
    /// Version the caller last saw. A mismatch fails with `StaleState`.
    pub expected_version: Option<u64>,
}

/// The box after a transition and the log entry describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceOutcome {
    pub instrument_box: InstrumentBox,
    pub log: WorkflowLogEntry,
}

impl<S: WorkflowStorage, C: Clock> Workflow<S, C> {
    /// Move the active box scanned as `code` to its next step.
    ///
    /// Leaving sterilization requires a control result: `passed` continues to
    /// control, `failed` restarts the cycle at reception and clears the
    /// assignment. Advancing a box at distribution is a return from use and
    /// closes its open assignment.
    pub async fn advance(
        &self,
        code: &str,
        actor: &str,
        request: AdvanceRequest,
    ) -> Result<AdvanceOutcome, WorkflowError> {
        let code = BoxCode::normalize(code)?;
        let actor = required("actor", actor)?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result = self.advance_in(&mut snapshot, &code, actor, request).await;
        let outcome = self.finish(snapshot, result).await?;

        tracing::info!(
            box_code = %outcome.instrument_box.code,
            from = ?outcome.log.from_step,
            to = %outcome.log.to_step,
            status = %outcome.instrument_box.status(),
            actor,
            version = outcome.instrument_box.version,
            "box advanced"
        );
        Ok(outcome)
    }

    async fn advance_in(
        &self,
        snapshot: &mut S::Snapshot,
        code: &BoxCode,
        actor: &str,
        request: AdvanceRequest,
    ) -> Result<AdvanceOutcome, WorkflowError> {
        let record = self
            .storage
            .get_box_by_code_for_update(snapshot, code)
            .await?;
        check_version(&record, request.expected_version)?;

        let plan = plan_transition(record.current_step, request.validation_result)?;
        if request.validation_result.is_some() && plan.validation_result.is_none() {
            tracing::debug!(
                box_code = %record.code,
                step = ?record.current_step,
                "control result ignored outside sterilization"
            );
        }

        self.apply_plan(
            snapshot,
            record,
            &plan,
            actor,
            request.sterilization_type,
            optional(request.notes.as_deref()),
        )
        .await
    }

    /// Send a box back to reception from wherever it is.
    ///
    /// The assignment fields are cleared and any open assignment is closed
    /// in the same snapshot. The log entry records the step the box left.
    pub async fn reset_to_reception(
        &self,
        box_id: &str,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<AdvanceOutcome, WorkflowError> {
        let actor = required("actor", actor)?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result: Result<AdvanceOutcome, WorkflowError> = async {
            let record = self.active_box_for_update(&mut snapshot, box_id).await?;
            let plan = plan_reset(record.current_step);
            self.apply_plan(&mut snapshot, record, &plan, actor, None, optional(notes))
                .await
        }
        .await;
        let outcome = self.finish(snapshot, result).await?;

        tracing::info!(
            box_code = %outcome.instrument_box.code,
            from = ?outcome.log.from_step,
            actor,
            "box reset to reception"
        );
        Ok(outcome)
    }

    /// Write `plan` for `record`: the box update, the closing of an open
    /// assignment when the plan clears it, and exactly one log entry.
    pub(super) async fn apply_plan(
        &self,
        snapshot: &mut S::Snapshot,
        mut record: InstrumentBox,
        plan: &TransitionPlan,
        actor: &str,
        sterilization_type: Option<SterilizationType>,
        notes: Option<String>,
    ) -> Result<AdvanceOutcome, WorkflowError> {
        let now = self.clock.now();
        let expected_version = record.version;

        if let Some(method) = sterilization_type {
            record.sterilization_type = Some(method);
        }
        record.current_step = Some(plan.to);

        if plan.clears_assignment {
            record.clear_assignment();
            if let Some(mut open) = self
                .storage
                .find_open_assignment_for_update(snapshot, &record.id)
                .await?
            {
                open.status = AssignmentStatus::Returned;
                open.returned_at = Some(now);
                open.returned_by = Some(actor.to_string());
                self.storage.update_assignment(snapshot, &open).await?;
            }
        }

        if plan.marks_sterilized {
            let validity = Duration::days(i64::from(self.config.sterile_validity_days));
            let due = now.checked_add(validity).ok_or_else(|| {
                WorkflowError::InvalidInput(format!(
                    "sterile validity of {} days is out of range",
                    self.config.sterile_validity_days
                ))
            })?;
            record.last_sterilized_at = Some(now);
            record.next_sterilization_due = Some(due);
        }

        record.updated_at = now;
        record.version = self
            .storage
            .update_box(snapshot, &record, expected_version)
            .await?;

        let notes = match (plan.restart_reason, notes) {
            (Some(reason), Some(extra)) => Some(format!("{reason}; {extra}")),
            (Some(reason), None) => Some(reason.to_string()),
            (None, notes) => notes,
        };
        let log = self
            .storage
            .append_log_entry(
                snapshot,
                WorkflowLogEntry {
                    id: new_id(),
                    box_id: record.id.clone(),
                    from_step: plan.from,
                    to_step: plan.to,
                    performed_by: actor.to_string(),
                    sterilization_type: record.sterilization_type,
                    validation_result: plan.validation_result,
                    notes,
                    created_at: now,
                    sequence: 0,
                },
            )
            .await?;

        Ok(AdvanceOutcome {
            instrument_box: record,
            log,
        })
    }

    /// Read an active box by id inside `snapshot`.
    pub(super) async fn active_box_for_update(
        &self,
        snapshot: &mut S::Snapshot,
        box_id: &str,
    ) -> Result<InstrumentBox, WorkflowError> {
        let record = self.storage.get_box_for_update(snapshot, box_id).await?;
        if !record.active {
            return Err(WorkflowError::NotFound {
                kind: "box",
                key: box_id.to_string(),
            });
        }
        Ok(record)
    }
}

fn check_version(record: &InstrumentBox, expected: Option<u64>) -> Result<(), WorkflowError> {
    match expected {
        Some(v) if v != record.version => Err(WorkflowError::StaleState {
            box_id: record.id.clone(),
            expected_version: v,
        }),
        _ => Ok(()),
    }
}
