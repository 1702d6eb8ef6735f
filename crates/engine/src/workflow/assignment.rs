//! Assignment sub-flow: sterile boxes handed to a requesting service.
//!
//! ```text
//! requested -> assigned -> in_use -> returned
//! ```
//!
//! `assign` moves the box to distribution (status in_use); `return_box`
//! sends it back to reception like a reset. A box holds at most one open
//! (not returned) assignment.

use steriflow_core::{
    plan_reset, AssignmentStatus, BoxAssignment, BoxStatus, InstrumentBox, Step, WorkflowLogEntry,
};
use steriflow_storage::WorkflowStorage;

use super::{new_id, optional, required, Workflow};
use crate::clock::Clock;
use crate::error::WorkflowError;

/// The closed assignment together with the reset it caused.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnOutcome {
    pub assignment: BoxAssignment,
    pub instrument_box: InstrumentBox,
    pub log: WorkflowLogEntry,
}

impl<S: WorkflowStorage, C: Clock> Workflow<S, C> {
    /// Record a service's request for a sterile box. The box does not move.
    pub async fn request_box(
        &self,
        box_id: &str,
        service_id: &str,
        bloc: Option<&str>,
        actor: &str,
    ) -> Result<BoxAssignment, WorkflowError> {
        let service_id = required("service id", service_id)?;
        let actor = required("actor", actor)?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result: Result<BoxAssignment, WorkflowError> = async {
            let record = self.active_box_for_update(&mut snapshot, box_id).await?;
            ensure_available(&record)?;
            if let Some(open) = self
                .storage
                .find_open_assignment_for_update(&mut snapshot, &record.id)
                .await?
            {
                return Err(open_assignment_conflict(&record, &open));
            }

            // Bumping the version serializes concurrent requests for one box.
            self.storage
                .update_box(&mut snapshot, &record, record.version)
                .await?;

            let assignment = BoxAssignment {
                id: new_id(),
                box_id: record.id.clone(),
                service_id: service_id.to_string(),
                bloc: optional(bloc),
                status: AssignmentStatus::Requested,
                requested_at: self.clock.now(),
                assigned_at: None,
                in_use_at: None,
                returned_at: None,
                requested_by: actor.to_string(),
                assigned_by: None,
                returned_by: None,
            };
            self.storage
                .insert_assignment(&mut snapshot, assignment.clone())
                .await?;
            Ok(assignment)
        }
        .await;
        let assignment = self.finish(snapshot, result).await?;

        tracing::info!(
            box_id = %assignment.box_id,
            service_id = %assignment.service_id,
            actor,
            "box requested"
        );
        Ok(assignment)
    }

    /// Hand a sterile box to `service_id`: the box moves to distribution and
    /// takes the service as its assignment.
    ///
    /// An open request by the same service is promoted; an open assignment
    /// for anyone else is a conflict.
    pub async fn assign(
        &self,
        box_id: &str,
        service_id: &str,
        bloc: Option<&str>,
        actor: &str,
    ) -> Result<BoxAssignment, WorkflowError> {
        let service_id = required("service id", service_id)?;
        let actor = required("actor", actor)?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result: Result<BoxAssignment, WorkflowError> = async {
            let mut record = self.active_box_for_update(&mut snapshot, box_id).await?;
            ensure_available(&record)?;
            let now = self.clock.now();

            let open = self
                .storage
                .find_open_assignment_for_update(&mut snapshot, &record.id)
                .await?;
            let assignment = match open {
                Some(mut request)
                    if request.status == AssignmentStatus::Requested
                        && request.service_id == service_id =>
                {
                    request.status = AssignmentStatus::Assigned;
                    request.assigned_at = Some(now);
                    request.assigned_by = Some(actor.to_string());
                    if let Some(bloc) = optional(bloc) {
                        request.bloc = Some(bloc);
                    }
                    self.storage
                        .update_assignment(&mut snapshot, &request)
                        .await?;
                    request
                }
                Some(other) => return Err(open_assignment_conflict(&record, &other)),
                None => {
                    let assignment = BoxAssignment {
                        id: new_id(),
                        box_id: record.id.clone(),
                        service_id: service_id.to_string(),
                        bloc: optional(bloc),
                        status: AssignmentStatus::Assigned,
                        requested_at: now,
                        assigned_at: Some(now),
                        in_use_at: None,
                        returned_at: None,
                        requested_by: actor.to_string(),
                        assigned_by: Some(actor.to_string()),
                        returned_by: None,
                    };
                    self.storage
                        .insert_assignment(&mut snapshot, assignment.clone())
                        .await?;
                    assignment
                }
            };

            let expected_version = record.version;
            let from_step = record.current_step;
            record.assigned_service_id = Some(assignment.service_id.clone());
            record.assigned_bloc = assignment.bloc.clone();
            record.current_step = Some(Step::Distribution);
            record.updated_at = now;
            self.storage
                .update_box(&mut snapshot, &record, expected_version)
                .await?;

            let notes = match &assignment.bloc {
                Some(bloc) => format!("assigned to {} ({bloc})", assignment.service_id),
                None => format!("assigned to {}", assignment.service_id),
            };
            self.storage
                .append_log_entry(
                    &mut snapshot,
                    WorkflowLogEntry {
                        id: new_id(),
                        box_id: record.id.clone(),
                        from_step,
                        to_step: Step::Distribution,
                        performed_by: actor.to_string(),
                        sterilization_type: record.sterilization_type,
                        validation_result: None,
                        notes: Some(notes),
                        created_at: now,
                        sequence: 0,
                    },
                )
                .await?;
            Ok(assignment)
        }
        .await;
        let assignment = self.finish(snapshot, result).await?;

        tracing::info!(
            box_id = %assignment.box_id,
            service_id = %assignment.service_id,
            actor,
            "box assigned"
        );
        Ok(assignment)
    }

    /// Mark an assigned box as in use by its service. The box itself does
    /// not move but its version is bumped.
    pub async fn confirm_in_use(
        &self,
        assignment_id: &str,
        actor: &str,
    ) -> Result<BoxAssignment, WorkflowError> {
        let actor = required("actor", actor)?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result: Result<BoxAssignment, WorkflowError> = async {
            let mut assignment = self
                .storage
                .get_assignment_for_update(&mut snapshot, assignment_id)
                .await?;
            if assignment.status != AssignmentStatus::Assigned {
                return Err(WorkflowError::Conflict(format!(
                    "assignment {} is {}, only assigned boxes can be confirmed in use",
                    assignment.id, assignment.status
                )));
            }

            // A return or reset committed since this read fails the commit.
            let record = self
                .storage
                .get_box_for_update(&mut snapshot, &assignment.box_id)
                .await?;
            self.storage
                .update_box(&mut snapshot, &record, record.version)
                .await?;

            assignment.status = AssignmentStatus::InUse;
            assignment.in_use_at = Some(self.clock.now());
            self.storage
                .update_assignment(&mut snapshot, &assignment)
                .await?;
            Ok(assignment)
        }
        .await;
        let assignment = self.finish(snapshot, result).await?;

        tracing::info!(assignment_id = %assignment.id, actor, "assignment in use");
        Ok(assignment)
    }

    /// Close an assignment and send its box back to reception.
    pub async fn return_box(
        &self,
        assignment_id: &str,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<ReturnOutcome, WorkflowError> {
        let actor = required("actor", actor)?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let result: Result<ReturnOutcome, WorkflowError> = async {
            let mut assignment = self
                .storage
                .get_assignment_for_update(&mut snapshot, assignment_id)
                .await?;
            match assignment.status {
                AssignmentStatus::Assigned | AssignmentStatus::InUse => {}
                AssignmentStatus::Requested => {
                    return Err(WorkflowError::Conflict(format!(
                        "assignment {} was requested but never assigned",
                        assignment.id
                    )))
                }
                AssignmentStatus::Returned => {
                    return Err(WorkflowError::Conflict(format!(
                        "assignment {} is already returned",
                        assignment.id
                    )))
                }
            }

            let now = self.clock.now();
            assignment.status = AssignmentStatus::Returned;
            assignment.returned_at = Some(now);
            assignment.returned_by = Some(actor.to_string());
            self.storage
                .update_assignment(&mut snapshot, &assignment)
                .await?;

            let record = self
                .storage
                .get_box_for_update(&mut snapshot, &assignment.box_id)
                .await?;
            let plan = plan_reset(record.current_step);
            let outcome = self
                .apply_plan(&mut snapshot, record, &plan, actor, None, optional(notes))
                .await?;

            Ok(ReturnOutcome {
                assignment,
                instrument_box: outcome.instrument_box,
                log: outcome.log,
            })
        }
        .await;
        let outcome = self.finish(snapshot, result).await?;

        tracing::info!(
            assignment_id = %outcome.assignment.id,
            box_code = %outcome.instrument_box.code,
            from = ?outcome.log.from_step,
            actor,
            "box returned"
        );
        Ok(outcome)
    }

    pub async fn get_assignment(&self, assignment_id: &str) -> Result<BoxAssignment, WorkflowError> {
        Ok(self.storage.get_assignment(assignment_id).await?)
    }

    /// Every assignment of a box, oldest request first.
    pub async fn list_assignments(
        &self,
        box_id: &str,
    ) -> Result<Vec<BoxAssignment>, WorkflowError> {
        self.storage.get_box(box_id).await?;
        Ok(self.storage.list_assignments(box_id).await?)
    }
}

/// A box can be requested or assigned only while sterile and unassigned.
fn ensure_available(record: &InstrumentBox) -> Result<(), WorkflowError> {
    let status = record.status();
    if status != BoxStatus::Sterile {
        return Err(WorkflowError::Conflict(format!(
            "box {} is {status}, only sterile boxes can be assigned",
            record.code
        )));
    }
    if let Some(service) = &record.assigned_service_id {
        return Err(WorkflowError::Conflict(format!(
            "box {} is already assigned to {service}",
            record.code
        )));
    }
    Ok(())
}

fn open_assignment_conflict(record: &InstrumentBox, open: &BoxAssignment) -> WorkflowError {
    WorkflowError::Conflict(format!(
        "box {} already has an open {} assignment for {}",
        record.code, open.status, open.service_id
    ))
}
