use std::future::Future;

use steriflow_core::Step;

use super::{commit_step, make_box, seed_box, TestResult};
use crate::{StorageError, WorkflowStorage};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    // Basic version tracking
    results.push(TestResult::from_result(
        "version",
        "version_increments_sequentially",
        version_increments_sequentially(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "record_version_field_is_ignored",
        record_version_field_is_ignored(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "second_update_same_snapshot_uses_new_version",
        second_update_same_snapshot_uses_new_version(factory).await,
    ));

    // Wrong version fails
    results.push(TestResult::from_result(
        "version",
        "update_with_wrong_version_returns_conflict",
        update_with_wrong_version_returns_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_has_correct_fields",
        conflict_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_does_not_change_box",
        conflict_does_not_change_box(factory).await,
    ));

    // Races between snapshots
    results.push(TestResult::from_result(
        "version",
        "stale_snapshot_update_conflicts",
        stale_snapshot_update_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "race_lost_after_staging_conflicts_at_commit",
        race_lost_after_staging_conflicts_at_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "version_per_box_independent",
        version_per_box_independent(factory).await,
    ));

    results
}

async fn version_increments_sequentially<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    for (expected, step) in [Step::Reception, Step::PreDisinfection, Step::Cleaning]
        .into_iter()
        .enumerate()
    {
        let v = commit_step(&s, "b1", step).await?;
        if v != expected as u64 + 1 {
            return Err(format!("expected version {}, got {v}", expected + 1));
        }
    }
    let b = s.get_box("b1").await.map_err(|e| e.to_string())?;
    if b.version != 3 {
        return Err(format!("expected stored version 3, got {}", b.version));
    }
    Ok(())
}

async fn record_version_field_is_ignored<S, F, Fut>(factory: &F) -> Result<(), String>
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
    b.version = 99;
    let v = s
        .update_box(&mut snap, &b, 0)
        .await
        .map_err(|e| format!("update_box: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s.get_box("b1").await.map_err(|e| e.to_string())?;
    if v != 1 || stored.version != 1 {
        return Err(format!("expected version 1, got {v} / {}", stored.version));
    }
    Ok(())
}

async fn second_update_same_snapshot_uses_new_version<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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
    let v1 = s
        .update_box(&mut snap, &b, 0)
        .await
        .map_err(|e| e.to_string())?;
    b.current_step = Some(Step::PreDisinfection);
    let v2 = s
        .update_box(&mut snap, &b, v1)
        .await
        .map_err(|e| format!("second update: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let stored = s.get_box("b1").await.map_err(|e| e.to_string())?;
    if v2 != 2 || stored.version != 2 || stored.current_step != Some(Step::PreDisinfection) {
        return Err(format!(
            "expected version 2 at pre_disinfection, got {} at {:?}",
            stored.version, stored.current_step
        ));
    }
    Ok(())
}

async fn update_with_wrong_version_returns_conflict<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    for wrong in [1u64, 7] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let b = s
            .get_box_for_update(&mut snap, "b1")
            .await
            .map_err(|e| e.to_string())?;
        let result = s.update_box(&mut snap, &b, wrong).await;
        let _ = s.abort_snapshot(snap).await;
        match result {
            Err(StorageError::ConcurrentConflict { .. }) => {}
            Err(e) => return Err(format!("expected ConcurrentConflict, got {e}")),
            Ok(v) => return Err(format!("update at version {wrong} succeeded with {v}")),
        }
    }
    Ok(())
}

async fn conflict_has_correct_fields<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .map_err(|e| e.to_string())?;
    let result = s.update_box(&mut snap, &b, 5).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            box_id,
            expected_version,
        }) => {
            if box_id != "b1" || expected_version != 5 {
                return Err(format!(
                    "conflict fields wrong: box_id={box_id}, expected_version={expected_version}"
                ));
            }
            Ok(())
        }
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn conflict_does_not_change_box<S, F, Fut>(factory: &F) -> Result<(), String>
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
    b.current_step = Some(Step::PreDisinfection);
    let _ = s.update_box(&mut snap, &b, 3).await;
    let after_in_snapshot = s
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    if after_in_snapshot.current_step.is_some() || after_in_snapshot.version != 0 {
        return Err("rejected update still changed the snapshot view".to_string());
    }
    Ok(())
}

async fn stale_snapshot_update_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    // Snap2 reads v0, then another transaction moves the box to v1.
    let mut snap2 = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut rec2 = s
        .get_box_for_update(&mut snap2, "b1")
        .await
        .map_err(|e| e.to_string())?;
    commit_step(&s, "b1", Step::Reception).await?;

    rec2.current_step = Some(Step::PreDisinfection);
    let result = match s.update_box(&mut snap2, &rec2, rec2.version).await {
        Ok(_) => s.commit_snapshot(snap2).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap2).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }

    let b = s.get_box("b1").await.map_err(|e| e.to_string())?;
    if b.current_step != Some(Step::Reception) || b.version != 1 {
        return Err(format!(
            "winner's write lost: {:?} v{}",
            b.current_step, b.version
        ));
    }
    Ok(())
}

async fn race_lost_after_staging_conflicts_at_commit<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    let mut snap1 = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut snap2 = s.begin_snapshot().await.map_err(|e| e.to_string())?;

    let mut rec1 = s
        .get_box_for_update(&mut snap1, "b1")
        .await
        .map_err(|e| e.to_string())?;
    let mut rec2 = s
        .get_box_for_update(&mut snap2, "b1")
        .await
        .map_err(|e| e.to_string())?;

    rec1.current_step = Some(Step::Reception);
    rec2.current_step = Some(Step::PreDisinfection);
    s.update_box(&mut snap1, &rec1, 0)
        .await
        .map_err(|e| format!("snap1 update: {e}"))?;
    let staged2 = s.update_box(&mut snap2, &rec2, 0).await;

    s.commit_snapshot(snap1)
        .await
        .map_err(|e| format!("snap1 commit: {e}"))?;

    let result = match staged2 {
        Ok(_) => s.commit_snapshot(snap2).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap2).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }

    let b = s.get_box("b1").await.map_err(|e| e.to_string())?;
    if b.current_step != Some(Step::Reception) {
        return Err(format!("expected winner's step, got {:?}", b.current_step));
    }
    Ok(())
}

async fn version_per_box_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    seed_box(&s, make_box("b2", "A-2")).await?;

    commit_step(&s, "b1", Step::Reception).await?;
    commit_step(&s, "b1", Step::PreDisinfection).await?;

    let b2_version = commit_step(&s, "b2", Step::Reception).await?;
    if b2_version != 1 {
        return Err(format!("b2 expected version 1, got {b2_version}"));
    }
    Ok(())
}
