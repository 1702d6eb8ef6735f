//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use steriflow_core::{Profile, Step};

use super::{make_assignment, make_box, make_log_entry, seed_box, TestResult};
use crate::{StorageError, WorkflowStorage};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "empty_snapshot_commits_and_aborts",
        empty_snapshot_commits_and_aborts(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_box_invisible",
        uncommitted_box_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_its_own_writes",
        snapshot_reads_its_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_all_writes",
        abort_discards_all_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_discards_writes",
        dropped_snapshot_discards_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));

    results
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

async fn empty_snapshot_commits_and_aborts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

// ── Isolation ────────────────────────────────────────────────────────────────

async fn uncommitted_box_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_box(&mut snap, make_box("b1", "A-1"))
        .await
        .map_err(|e| format!("insert_box: {e}"))?;

    let visible = s.get_box("b1").await;
    let listed = s.list_boxes(true).await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    match visible {
        Err(StorageError::BoxNotFound { .. }) => {}
        Err(e) => return Err(format!("expected BoxNotFound before commit, got {e}")),
        Ok(_) => return Err("uncommitted box visible to get_box".to_string()),
    }
    if !listed.is_empty() {
        return Err("uncommitted box visible to list_boxes".to_string());
    }
    s.get_box("b1")
        .await
        .map_err(|e| format!("box not visible after commit: {e}"))?;
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let outside = s.get_box("b1").await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if outside.current_step.is_some() || outside.version != 0 {
        return Err(format!(
            "uncommitted update visible: step {:?}, version {}",
            outside.current_step, outside.version
        ));
    }
    let after = s.get_box("b1").await.map_err(|e| e.to_string())?;
    if after.current_step != Some(Step::Reception) || after.version != 1 {
        return Err(format!(
            "committed update missing: step {:?}, version {}",
            after.current_step, after.version
        ));
    }
    Ok(())
}

async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_box(&mut snap, make_box("b1", "A-1"))
        .await
        .map_err(|e| e.to_string())?;
    let mut b = s
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| format!("own insert not readable: {e}"))?;
    b.current_step = Some(Step::Reception);
    let v1 = s
        .update_box(&mut snap, &b, 0)
        .await
        .map_err(|e| format!("first update: {e}"))?;
    let b = s
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    if v1 != 1 || b.version != 1 || b.current_step != Some(Step::Reception) {
        return Err(format!(
            "own update not visible: version {} step {:?}",
            b.version, b.current_step
        ));
    }
    Ok(())
}

// ── Abort ────────────────────────────────────────────────────────────────────

async fn abort_discards_all_writes<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.insert_assignment(&mut snap, make_assignment("a1", "b1", "svc", 0))
        .await
        .map_err(|e| e.to_string())?;
    s.upsert_profile(
        &mut snap,
        Profile {
            actor_id: "actor-1".to_string(),
            full_name: "Ada".to_string(),
        },
    )
    .await
    .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let b = s.get_box("b1").await.map_err(|e| e.to_string())?;
    if b.current_step.is_some() || b.version != 0 {
        return Err("aborted box update persisted".to_string());
    }
    if !s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?
        .is_empty()
    {
        return Err("aborted log entry persisted".to_string());
    }
    if s.get_assignment("a1").await.is_ok() {
        return Err("aborted assignment persisted".to_string());
    }
    if !s
        .get_profiles(&["actor-1".to_string()])
        .await
        .map_err(|e| e.to_string())?
        .is_empty()
    {
        return Err("aborted profile persisted".to_string());
    }
    Ok(())
}

async fn dropped_snapshot_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_box(&mut snap, make_box("b1", "A-1"))
            .await
            .map_err(|e| e.to_string())?;
        drop(snap);
    }
    if s.get_box("b1").await.is_ok() {
        return Err("box from dropped snapshot is visible".to_string());
    }
    Ok(())
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let b = s
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| format!("second snapshot cannot see committed box: {e}"))?;
    let _ = s.abort_snapshot(snap).await;
    if b.id != "b1" {
        return Err(format!("expected b1, got {}", b.id));
    }
    Ok(())
}
