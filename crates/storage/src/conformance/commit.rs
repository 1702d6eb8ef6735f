//! Atomic commit conformance tests.
//!
//! A transition writes a box and a log entry (and, on some paths, an
//! assignment). These must become visible together or not at all.

use std::future::Future;

use steriflow_core::{Profile, Step, ValidationResult};

use super::{make_assignment, make_box, make_log_entry, seed_box, TestResult};
use crate::WorkflowStorage;

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "box_update_and_log_entry_visible_together",
        box_update_and_log_entry_visible_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "box_update_and_log_entry_aborted_together",
        box_update_and_log_entry_aborted_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "box_assignment_and_log_committed_together",
        box_assignment_and_log_committed_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "fields_preserved_through_commit",
        fields_preserved_through_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multiple_boxes_in_one_snapshot",
        multiple_boxes_in_one_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "multiple_commits_accumulate",
        multiple_commits_accumulate(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "profile_upsert_replaces_name",
        profile_upsert_replaces_name(factory).await,
    ));

    results
}

// ── Box + log coupling ───────────────────────────────────────────────────────

async fn box_update_and_log_entry_visible_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut b = s
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| e.to_string())?;
    b.current_step = Some(Step::Reception);
    s.update_box(&mut snap, &b, 0)
        .await
        .map_err(|e| format!("update_box: {e}"))?;
    s.append_log_entry(
        &mut snap,
        make_log_entry("l1", "b1", None, Step::Reception, 0),
    )
    .await
    .map_err(|e| format!("append_log_entry: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let b = s.get_box("b1").await.map_err(|e| e.to_string())?;
    let log = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    if b.current_step != Some(Step::Reception) {
        return Err(format!("box step not committed: {:?}", b.current_step));
    }
    if log.len() != 1 || log[0].id != "l1" {
        return Err(format!("expected one log entry l1, got {}", log.len()));
    }
    Ok(())
}

async fn box_update_and_log_entry_aborted_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut b = s
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| e.to_string())?;
    b.current_step = Some(Step::Reception);
    s.update_box(&mut snap, &b, 0)
        .await
        .map_err(|e| e.to_string())?;
    s.append_log_entry(
        &mut snap,
        make_log_entry("l1", "b1", None, Step::Reception, 0),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let b = s.get_box("b1").await.map_err(|e| e.to_string())?;
    let log = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    if b.current_step.is_some() || !log.is_empty() {
        return Err("aborted transition left a trace".to_string());
    }
    Ok(())
}

async fn box_assignment_and_log_committed_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut stored = make_box("b1", "A-1");
    stored.current_step = Some(Step::Storage);
    seed_box(&s, stored).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut b = s
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| e.to_string())?;
    b.current_step = Some(Step::Distribution);
    b.assigned_service_id = Some("cardio".to_string());
    s.update_box(&mut snap, &b, 0)
        .await
        .map_err(|e| e.to_string())?;
    s.insert_assignment(&mut snap, make_assignment("a1", "b1", "cardio", 5))
        .await
        .map_err(|e| format!("insert_assignment: {e}"))?;
    s.append_log_entry(
        &mut snap,
        make_log_entry("l1", "b1", Some(Step::Storage), Step::Distribution, 5),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let b = s.get_box("b1").await.map_err(|e| e.to_string())?;
    let a = s
        .get_assignment("a1")
        .await
        .map_err(|e| format!("assignment not committed: {e}"))?;
    let log = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    if b.assigned_service_id.as_deref() != Some("cardio") || a.service_id != "cardio" {
        return Err("assignment fields not committed".to_string());
    }
    if log.len() != 1 {
        return Err(format!("expected 1 log entry, got {}", log.len()));
    }
    Ok(())
}

async fn fields_preserved_through_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    let mut entry = make_log_entry("l1", "b1", Some(Step::Sterilization), Step::Control, 3);
    entry.performed_by = "tech-7".to_string();
    entry.notes = Some("cycle 42".to_string());
    entry.validation_result = Some(ValidationResult::Passed);

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let stored = s
        .append_log_entry(&mut snap, entry.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let log = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    let read = log.first().ok_or("log entry missing")?;
    if read != &stored {
        return Err(format!("stored entry differs: {read:?} vs {stored:?}"));
    }
    if read.performed_by != "tech-7" || read.notes.as_deref() != Some("cycle 42") {
        return Err("log entry fields not preserved".to_string());
    }
    Ok(())
}

async fn multiple_boxes_in_one_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for i in 0..3 {
        s.insert_box(&mut snap, make_box(&format!("b{i}"), &format!("SET-{i}")))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let boxes = s.list_boxes(false).await.map_err(|e| e.to_string())?;
    if boxes.len() != 3 {
        return Err(format!("expected 3 boxes, got {}", boxes.len()));
    }
    Ok(())
}

async fn multiple_commits_accumulate<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    for (i, id) in ["l1", "l2", "l3"].iter().enumerate() {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.append_log_entry(
            &mut snap,
            make_log_entry(id, "b1", None, Step::Reception, i as i64),
        )
        .await
        .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }
    let log = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    if log.len() != 3 {
        return Err(format!("expected 3 entries, got {}", log.len()));
    }
    Ok(())
}

async fn profile_upsert_replaces_name<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for name in ["Ada", "Ada Lovelace"] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.upsert_profile(
            &mut snap,
            Profile {
                actor_id: "actor-1".to_string(),
                full_name: name.to_string(),
            },
        )
        .await
        .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }
    let profiles = s
        .get_profiles(&["actor-1".to_string(), "actor-1".to_string()])
        .await
        .map_err(|e| e.to_string())?;
    if profiles.len() != 1 || profiles[0].full_name != "Ada Lovelace" {
        return Err(format!("unexpected profiles: {profiles:?}"));
    }
    Ok(())
}
