use steriflow_core::{
    AssignmentStatus, BoxStatus, Step, SterilizationType, ValidationResult, CONTROL_FAILED_NOTE,
};
use steriflow_storage::{MemoryStorage, WorkflowStorage};
use time::macros::datetime;
use time::Duration;

use super::*;
use crate::clock::FixedClock;
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;

fn workflow() -> (Workflow<MemoryStorage, FixedClock>, FixedClock) {
    let clock = FixedClock::new(datetime!(2026-03-02 08:00 UTC));
    (
        Workflow::with_clock(MemoryStorage::new(), clock.clone()),
        clock,
    )
}

fn passed() -> AdvanceRequest {
    AdvanceRequest {
        validation_result: Some(ValidationResult::Passed),
        ..AdvanceRequest::default()
    }
}

/// Advance `code` until it sits at `target`, passing control on the way.
async fn advance_to(wf: &Workflow<MemoryStorage, FixedClock>, code: &str, target: Step) {
    loop {
        let current = wf.get_box(code).await.unwrap().current_step;
        if current == Some(target) {
            return;
        }
        let request = if current == Some(Step::Sterilization) {
            passed()
        } else {
            AdvanceRequest::default()
        };
        wf.advance(code, "tech-1", request).await.unwrap();
    }
}

// ──────────────────────────────────────
// Registry
// ──────────────────────────────────────

#[tokio::test]
async fn registered_box_is_dirty_without_step() {
    let (wf, _) = workflow();
    let b = wf
        .register_box(" ortho-1 ", "Orthopedic set", Some(SterilizationType::Steam))
        .await
        .unwrap();
    assert_eq!(b.code.as_str(), "ORTHO-1");
    assert_eq!(b.current_step, None);
    assert_eq!(b.status(), BoxStatus::Dirty);
    assert_eq!(b.version, 0);

    let found = wf.get_box("ORTHO-1").await.unwrap();
    assert_eq!(found.id, b.id);
}

#[tokio::test]
async fn blank_name_falls_back_to_code() {
    let (wf, _) = workflow();
    let b = wf.register_box("lap-2", "  ", None).await.unwrap();
    assert_eq!(b.name, "LAP-2");
}

#[tokio::test]
async fn duplicate_or_empty_code_is_invalid_input() {
    let (wf, _) = workflow();
    wf.register_box("ORTHO-1", "a", None).await.unwrap();
    let err = wf.register_box("ortho-1", "b", None).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_input", "{err}");
    let err = wf.register_box("   ", "c", None).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_input", "{err}");
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let (wf, _) = workflow();
    let err = wf
        .advance("NOPE", "tech-1", AdvanceRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { kind: "box", .. }), "{err}");
}

#[tokio::test]
async fn deactivated_box_is_hidden_but_keeps_history() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    wf.advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();

    let retired = wf.deactivate_box(&b.id).await.unwrap();
    assert!(!retired.active);
    assert!(wf.get_box("A-1").await.is_err());
    assert!(wf.list_boxes(None).await.unwrap().is_empty());
    assert_eq!(wf.history(&b.id, None).await.unwrap().len(), 1);

    // The code is free again.
    wf.register_box("A-1", "replacement", None).await.unwrap();
}

#[tokio::test]
async fn deactivate_rejects_box_with_open_assignment() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;
    wf.assign(&b.id, "cardio", None, "nurse-1").await.unwrap();

    let err = wf.deactivate_box(&b.id).await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");
}

#[tokio::test]
async fn list_boxes_filters_by_derived_status() {
    let (wf, _) = workflow();
    wf.register_box("B-1", "b", None).await.unwrap();
    wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "B-1", Step::Cleaning).await;

    let all: Vec<String> = wf
        .list_boxes(None)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.code.to_string())
        .collect();
    assert_eq!(all, ["A-1", "B-1"]);

    let cleaning = wf.list_boxes(Some(BoxStatus::Cleaning)).await.unwrap();
    assert_eq!(cleaning.len(), 1);
    assert_eq!(cleaning[0].code.as_str(), "B-1");
}

// ──────────────────────────────────────
// Advance
// ──────────────────────────────────────

#[tokio::test]
async fn first_advance_enters_reception_from_nothing() {
    let (wf, _) = workflow();
    wf.register_box("A-1", "a", None).await.unwrap();
    let out = wf
        .advance("a-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();
    assert_eq!(out.instrument_box.current_step, Some(Step::Reception));
    assert_eq!(out.log.from_step, None);
    assert_eq!(out.log.to_step, Step::Reception);
    assert_eq!(out.log.performed_by, "tech-1");
    assert_eq!(out.instrument_box.version, 1);
}

#[tokio::test]
async fn each_advance_writes_exactly_one_matching_entry() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    let mut previous = None;
    for _ in 0..5 {
        let out = wf
            .advance("A-1", "tech-1", AdvanceRequest::default())
            .await
            .unwrap();
        assert_eq!(out.log.from_step, previous);
        assert_eq!(Some(out.log.to_step), out.instrument_box.current_step);
        previous = out.instrument_box.current_step;
    }
    assert_eq!(previous, Some(Step::Sterilization));
    assert_eq!(wf.history(&b.id, None).await.unwrap().len(), 5);
}

#[tokio::test]
async fn leaving_sterilization_without_result_changes_nothing() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Sterilization).await;
    let before = wf.get_box("A-1").await.unwrap();

    let err = wf
        .advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, WorkflowError::ValidationRequired { step: Step::Sterilization }),
        "{err}"
    );

    let after = wf.get_box("A-1").await.unwrap();
    assert_eq!(after, before);
    assert_eq!(wf.history(&b.id, Some(100)).await.unwrap().len(), 5);
}

#[tokio::test]
async fn failed_control_restarts_at_reception() {
    let (wf, _) = workflow();
    wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Sterilization).await;

    let out = wf
        .advance(
            "A-1",
            "tech-2",
            AdvanceRequest {
                validation_result: Some(ValidationResult::Failed),
                sterilization_type: Some(SterilizationType::Steam),
                ..AdvanceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(out.instrument_box.current_step, Some(Step::Reception));
    assert_eq!(out.instrument_box.status(), BoxStatus::Dirty);
    assert_eq!(out.instrument_box.last_sterilized_at, None);
    assert_eq!(out.log.from_step, Some(Step::Sterilization));
    assert_eq!(out.log.to_step, Step::Reception);
    assert_eq!(out.log.validation_result, Some(ValidationResult::Failed));
    assert_eq!(out.log.sterilization_type, Some(SterilizationType::Steam));
    assert_eq!(out.log.notes.as_deref(), Some(CONTROL_FAILED_NOTE));
}

#[tokio::test]
async fn failed_control_clears_assignment_fields_left_on_the_box() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Sterilization).await;

    let mut snapshot = wf.storage().begin_snapshot().await.unwrap();
    let mut record = wf
        .storage()
        .get_box_for_update(&mut snapshot, &b.id)
        .await
        .unwrap();
    let version = record.version;
    record.assigned_service_id = Some("cardio".to_string());
    record.assigned_bloc = Some("bloc 3".to_string());
    wf.storage()
        .update_box(&mut snapshot, &record, version)
        .await
        .unwrap();
    wf.storage().commit_snapshot(snapshot).await.unwrap();

    let out = wf
        .advance(
            "A-1",
            "tech-2",
            AdvanceRequest {
                validation_result: Some(ValidationResult::Failed),
                ..AdvanceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(out.instrument_box.current_step, Some(Step::Reception));
    assert_eq!(out.instrument_box.assigned_service_id, None);
    assert_eq!(out.instrument_box.assigned_bloc, None);

    let stored = wf.get_box_by_id(&b.id).await.unwrap();
    assert_eq!(stored.assigned_service_id, None);
    assert_eq!(stored.assigned_bloc, None);
}

#[tokio::test]
async fn restart_note_keeps_operator_notes() {
    let (wf, _) = workflow();
    wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Sterilization).await;
    let out = wf
        .advance(
            "A-1",
            "tech-2",
            AdvanceRequest {
                validation_result: Some(ValidationResult::Failed),
                notes: Some("indicator strip unchanged".to_string()),
                ..AdvanceRequest::default()
            },
        )
        .await
        .unwrap();
    let notes = out.log.notes.unwrap();
    assert!(notes.starts_with(CONTROL_FAILED_NOTE));
    assert!(notes.ends_with("indicator strip unchanged"));
}

#[tokio::test]
async fn control_result_outside_sterilization_is_not_recorded() {
    let (wf, _) = workflow();
    wf.register_box("A-1", "a", None).await.unwrap();
    let out = wf
        .advance(
            "A-1",
            "tech-1",
            AdvanceRequest {
                validation_result: Some(ValidationResult::Failed),
                ..AdvanceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(out.log.to_step, Step::Reception);
    assert_eq!(out.log.validation_result, None);
}

#[tokio::test]
async fn entering_storage_sets_sterilization_dates() {
    let (wf, clock) = workflow();
    let wf = wf.with_config(WorkflowConfig {
        sterile_validity_days: 14,
        ..WorkflowConfig::default()
    });
    wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Control).await;
    assert_eq!(wf.get_box("A-1").await.unwrap().last_sterilized_at, None);

    clock.set(datetime!(2026-03-05 10:00 UTC));
    let out = wf
        .advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();
    assert_eq!(out.instrument_box.current_step, Some(Step::Storage));
    assert_eq!(
        out.instrument_box.last_sterilized_at,
        Some(datetime!(2026-03-05 10:00 UTC))
    );
    assert_eq!(
        out.instrument_box.next_sterilization_due,
        Some(datetime!(2026-03-19 10:00 UTC))
    );

    // No later transition touches the timestamp.
    clock.advance(Duration::hours(1));
    let out = wf
        .advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();
    assert_eq!(out.instrument_box.current_step, Some(Step::Distribution));
    assert_eq!(
        out.instrument_box.last_sterilized_at,
        Some(datetime!(2026-03-05 10:00 UTC))
    );
}

#[tokio::test]
async fn out_of_range_validity_fails_without_moving_the_box() {
    let (wf, _) = workflow();
    let wf = wf.with_config(WorkflowConfig {
        sterile_validity_days: u32::MAX,
        ..WorkflowConfig::default()
    });
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Control).await;
    let before = wf.get_box("A-1").await.unwrap();

    let err = wf
        .advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_input", "{err}");
    assert_eq!(wf.get_box("A-1").await.unwrap(), before);
    assert_eq!(wf.history(&b.id, Some(100)).await.unwrap().len(), 6);
}

#[tokio::test]
async fn expected_version_mismatch_is_stale_state() {
    let (wf, _) = workflow();
    wf.register_box("A-1", "a", None).await.unwrap();
    wf.advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();

    let err = wf
        .advance(
            "A-1",
            "tech-1",
            AdvanceRequest {
                expected_version: Some(0),
                ..AdvanceRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "stale_state", "{err}");
    assert_eq!(
        wf.get_box("A-1").await.unwrap().current_step,
        Some(Step::Reception)
    );

    let out = wf
        .advance(
            "A-1",
            "tech-1",
            AdvanceRequest {
                expected_version: Some(1),
                ..AdvanceRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(out.instrument_box.current_step, Some(Step::PreDisinfection));
}

#[tokio::test]
async fn blank_actor_is_rejected() {
    let (wf, _) = workflow();
    wf.register_box("A-1", "a", None).await.unwrap();
    let err = wf
        .advance("A-1", " ", AdvanceRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_input");
}

// ──────────────────────────────────────
// Reset
// ──────────────────────────────────────

#[tokio::test]
async fn reset_from_any_step_goes_to_reception() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Conditioning).await;

    let out = wf
        .reset_to_reception(&b.id, "nurse-1", Some("dropped on floor"))
        .await
        .unwrap();
    assert_eq!(out.instrument_box.current_step, Some(Step::Reception));
    assert_eq!(out.instrument_box.status(), BoxStatus::Dirty);
    assert_eq!(out.log.from_step, Some(Step::Conditioning));
    assert_eq!(out.log.to_step, Step::Reception);
    assert_eq!(out.log.notes.as_deref(), Some("dropped on floor"));
}

#[tokio::test]
async fn reset_closes_open_assignment() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;
    let a = wf
        .assign(&b.id, "cardio", Some("bloc 3"), "nurse-1")
        .await
        .unwrap();

    let out = wf.reset_to_reception(&b.id, "nurse-2", None).await.unwrap();
    assert_eq!(out.log.from_step, Some(Step::Distribution));
    assert_eq!(out.instrument_box.assigned_service_id, None);
    assert_eq!(out.instrument_box.assigned_bloc, None);

    let closed = wf.get_assignment(&a.id).await.unwrap();
    assert_eq!(closed.status, AssignmentStatus::Returned);
    assert_eq!(closed.returned_by.as_deref(), Some("nurse-2"));
}

#[tokio::test]
async fn reset_unknown_box_is_not_found() {
    let (wf, _) = workflow();
    let err = wf
        .reset_to_reception("missing", "nurse-1", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

// ──────────────────────────────────────
// Assignment sub-flow
// ──────────────────────────────────────

#[tokio::test]
async fn assign_moves_sterile_box_to_distribution() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;

    let a = wf
        .assign(&b.id, "cardio", Some("bloc 3"), "nurse-1")
        .await
        .unwrap();
    assert_eq!(a.status, AssignmentStatus::Assigned);
    assert_eq!(a.assigned_by.as_deref(), Some("nurse-1"));

    let boxed = wf.get_box_by_id(&b.id).await.unwrap();
    assert_eq!(boxed.current_step, Some(Step::Distribution));
    assert_eq!(boxed.status(), BoxStatus::InUse);
    assert_eq!(boxed.assigned_service_id.as_deref(), Some("cardio"));
    assert_eq!(boxed.assigned_bloc.as_deref(), Some("bloc 3"));

    let latest = &wf.history(&b.id, Some(1)).await.unwrap()[0];
    assert_eq!(latest.entry.from_step, Some(Step::Storage));
    assert_eq!(latest.entry.to_step, Step::Distribution);
}

#[tokio::test]
async fn assign_rejects_non_sterile_or_assigned_box() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Cleaning).await;
    let err = wf.assign(&b.id, "cardio", None, "nurse-1").await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");

    advance_to(&wf, "A-1", Step::Storage).await;
    wf.assign(&b.id, "cardio", None, "nurse-1").await.unwrap();
    let err = wf.assign(&b.id, "ortho", None, "nurse-1").await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");
}

#[tokio::test]
async fn request_then_assign_promotes_the_request() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;

    let request = wf
        .request_box(&b.id, "cardio", Some("bloc 1"), "secretary-1")
        .await
        .unwrap();
    assert_eq!(request.status, AssignmentStatus::Requested);
    let still = wf.get_box_by_id(&b.id).await.unwrap();
    assert_eq!(still.current_step, Some(Step::Storage));
    assert_eq!(still.assigned_service_id, None);

    let err = wf.assign(&b.id, "ortho", None, "nurse-1").await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");

    let assigned = wf.assign(&b.id, "cardio", None, "nurse-1").await.unwrap();
    assert_eq!(assigned.id, request.id);
    assert_eq!(assigned.status, AssignmentStatus::Assigned);
    assert_eq!(assigned.requested_by, "secretary-1");
    assert_eq!(assigned.bloc.as_deref(), Some("bloc 1"));
    assert_eq!(wf.list_assignments(&b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_request_conflicts() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Control).await;
    wf.request_box(&b.id, "cardio", None, "s-1").await.unwrap();
    let err = wf
        .request_box(&b.id, "cardio", None, "s-2")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");
}

#[tokio::test]
async fn confirm_requires_assigned_status() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;
    let request = wf.request_box(&b.id, "cardio", None, "s-1").await.unwrap();

    let err = wf.confirm_in_use(&request.id, "nurse-1").await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");

    wf.assign(&b.id, "cardio", None, "nurse-1").await.unwrap();
    let in_use = wf.confirm_in_use(&request.id, "nurse-1").await.unwrap();
    assert_eq!(in_use.status, AssignmentStatus::InUse);
    assert!(in_use.in_use_at.is_some());

    let err = wf.confirm_in_use(&request.id, "nurse-1").await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");
}

#[tokio::test]
async fn return_closes_assignment_and_resets_box() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;
    let a = wf.assign(&b.id, "cardio", None, "nurse-1").await.unwrap();
    wf.confirm_in_use(&a.id, "nurse-1").await.unwrap();

    let out = wf.return_box(&a.id, "porter-1", None).await.unwrap();
    assert_eq!(out.assignment.status, AssignmentStatus::Returned);
    assert_eq!(out.assignment.returned_by.as_deref(), Some("porter-1"));
    assert!(out.assignment.returned_at.is_some());
    assert_eq!(out.instrument_box.current_step, Some(Step::Reception));
    assert_eq!(out.instrument_box.assigned_service_id, None);
    assert_eq!(out.log.from_step, Some(Step::Distribution));
    assert_eq!(out.log.to_step, Step::Reception);

    let err = wf.return_box(&a.id, "porter-1", None).await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");
}

#[tokio::test]
async fn return_of_unassigned_request_conflicts() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;
    let request = wf.request_box(&b.id, "cardio", None, "s-1").await.unwrap();
    let err = wf.return_box(&request.id, "porter-1", None).await.unwrap_err();
    assert_eq!(err.kind(), "conflict", "{err}");
}

#[tokio::test]
async fn unknown_assignment_is_not_found() {
    let (wf, _) = workflow();
    let err = wf.return_box("nope", "porter-1", None).await.unwrap_err();
    assert!(
        matches!(err, WorkflowError::NotFound { kind: "assignment", .. }),
        "{err}"
    );
}

// ──────────────────────────────────────
// History and reports
// ──────────────────────────────────────

#[tokio::test]
async fn history_resolves_names_and_falls_back_to_unknown() {
    let (wf, clock) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    wf.add_operator("tech-1", "Ada Lovelace").await.unwrap();

    wf.advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();
    clock.advance(Duration::minutes(5));
    wf.advance("A-1", "ghost", AdvanceRequest::default())
        .await
        .unwrap();

    let history = wf.history(&b.id, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].entry.performed_by, "ghost");
    assert_eq!(history[0].actor_name, UNKNOWN_ACTOR);
    assert_eq!(history[1].actor_name, "Ada Lovelace");
}

#[tokio::test]
async fn history_defaults_to_configured_limit() {
    let (wf, _) = workflow();
    let wf = wf.with_config(WorkflowConfig {
        history_limit: 3,
        ..WorkflowConfig::default()
    });
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Sterilization).await;
    assert_eq!(wf.history(&b.id, None).await.unwrap().len(), 3);
    assert_eq!(wf.history(&b.id, Some(10)).await.unwrap().len(), 5);
}

#[tokio::test]
async fn history_of_unknown_box_is_not_found() {
    let (wf, _) = workflow();
    let err = wf.history("missing", None).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn zero_history_limit_is_invalid_input() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    wf.advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();
    let err = wf.history(&b.id, Some(0)).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_input", "{err}");
}

#[tokio::test]
async fn history_entry_serializes_flat() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    wf.advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();
    let history = wf.history(&b.id, None).await.unwrap();
    let json = serde_json::to_value(&history[0]).unwrap();
    assert_eq!(json["to_step"], "reception");
    assert_eq!(json["actor_name"], UNKNOWN_ACTOR);
}

#[tokio::test]
async fn expiring_report_lists_sterile_boxes_due_soon() {
    let (wf, clock) = workflow();
    wf.register_box("SOON", "s", None).await.unwrap();
    wf.register_box("LATER", "l", None).await.unwrap();
    wf.register_box("DIRTY", "d", None).await.unwrap();

    advance_to(&wf, "SOON", Step::Storage).await;
    clock.advance(Duration::days(20));
    advance_to(&wf, "LATER", Step::Storage).await;
    wf.advance("DIRTY", "tech-1", AdvanceRequest::default())
        .await
        .unwrap();

    // SOON is due at day 30, LATER at day 50; now is day 20.
    let codes: Vec<String> = wf
        .expiring_boxes(Duration::days(15))
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.code.to_string())
        .collect();
    assert_eq!(codes, ["SOON"]);

    let codes = wf.expiring_boxes(Duration::days(40)).await.unwrap();
    assert_eq!(codes.len(), 2);
    assert_eq!(codes[0].code.as_str(), "SOON");
}

#[tokio::test]
async fn expiry_window_out_of_range_is_invalid_input() {
    let (wf, _) = workflow();
    wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Storage).await;
    let err = wf
        .expiring_boxes(Duration::days(i64::from(u32::MAX)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_input", "{err}");
}

#[tokio::test]
async fn storage_is_left_consistent_after_rejected_advance() {
    let (wf, _) = workflow();
    let b = wf.register_box("A-1", "a", None).await.unwrap();
    advance_to(&wf, "A-1", Step::Sterilization).await;
    let _ = wf
        .advance("A-1", "tech-1", AdvanceRequest::default())
        .await
        .unwrap_err();
    let log = wf.storage().list_log_entries(&b.id, 0).await.unwrap();
    assert_eq!(log.len(), 5);
    assert_eq!(log[0].to_step, Step::Sterilization);
}
