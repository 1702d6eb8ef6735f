use std::future::Future;

use super::{code, make_box, seed_box, TestResult};
use crate::{StorageError, WorkflowStorage};

pub(super) async fn run_register_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "register",
        "inserted_box_starts_at_version_0",
        inserted_box_starts_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "inserted_box_has_no_step",
        inserted_box_has_no_step(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "inserted_box_readable_by_id_and_code",
        inserted_box_readable_by_id_and_code(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "duplicate_active_code_rejected_in_snapshot",
        duplicate_active_code_rejected_in_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "duplicate_active_code_rejected_across_snapshots",
        duplicate_active_code_rejected_across_snapshots(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "duplicate_id_rejected",
        duplicate_id_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "code_reusable_after_deactivation",
        code_reusable_after_deactivation(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "list_boxes_ordered_by_code",
        list_boxes_ordered_by_code(factory).await,
    ));
    results.push(TestResult::from_result(
        "register",
        "list_boxes_skips_inactive_by_default",
        list_boxes_skips_inactive_by_default(factory).await,
    ));

    results
}

// ── Basic insertion ──────────────────────────────────────────────────────────

async fn inserted_box_starts_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "ORTHO-1")).await?;

    let b = storage
        .get_box("b1")
        .await
        .map_err(|e| format!("get_box: {e}"))?;
    if b.version != 0 {
        return Err(format!("expected version 0, got {}", b.version));
    }
    Ok(())
}

async fn inserted_box_has_no_step<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "ORTHO-1")).await?;

    let b = storage
        .get_box("b1")
        .await
        .map_err(|e| format!("get_box: {e}"))?;
    if b.current_step.is_some() {
        return Err(format!("expected no step, got {:?}", b.current_step));
    }
    if !b.active {
        return Err("new box should be active".to_string());
    }
    Ok(())
}

async fn inserted_box_readable_by_id_and_code<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "ORTHO-1")).await?;

    let by_code = storage
        .get_box_by_code(&code("ortho-1"))
        .await
        .map_err(|e| format!("get_box_by_code: {e}"))?;
    if by_code.id != "b1" {
        return Err(format!("expected b1, got {}", by_code.id));
    }

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let for_update = storage
        .get_box_by_code_for_update(&mut snap, &code("ORTHO-1"))
        .await
        .map_err(|e| format!("get_box_by_code_for_update: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;
    if for_update != by_code {
        return Err("snapshot read differs from committed read".to_string());
    }
    Ok(())
}

// ── Uniqueness ───────────────────────────────────────────────────────────────

async fn duplicate_active_code_rejected_in_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_box(&mut snap, make_box("b1", "ORTHO-1"))
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    let result = storage
        .insert_box(&mut snap, make_box("b2", "ORTHO-1"))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::DuplicateBoxCode { code }) if code == "ORTHO-1" => Ok(()),
        Err(e) => Err(format!("expected DuplicateBoxCode, got {e}")),
        Ok(()) => Err("expected DuplicateBoxCode, got Ok".to_string()),
    }
}

async fn duplicate_active_code_rejected_across_snapshots<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "ORTHO-1")).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .insert_box(&mut snap, make_box("b2", "ORTHO-1"))
        .await;
    let result = match result {
        Ok(()) => storage.commit_snapshot(snap).await,
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    };

    match result {
        Err(StorageError::DuplicateBoxCode { .. }) => Ok(()),
        Err(e) => Err(format!("expected DuplicateBoxCode, got {e}")),
        Ok(()) => Err("second box with the same active code was committed".to_string()),
    }
}

async fn duplicate_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "ORTHO-1")).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .insert_box(&mut snap, make_box("b1", "ORTHO-2"))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::AlreadyExists { kind: "box", id }) if id == "b1" => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists(box), got {e}")),
        Ok(()) => Err("expected AlreadyExists, got Ok".to_string()),
    }
}

async fn code_reusable_after_deactivation<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "ORTHO-1")).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut old = storage
        .get_box_for_update(&mut snap, "b1")
        .await
        .map_err(|e| format!("get_box_for_update: {e}"))?;
    old.active = false;
    storage
        .update_box(&mut snap, &old, 0)
        .await
        .map_err(|e| format!("deactivate: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit deactivate: {e}"))?;

    seed_box(&storage, make_box("b2", "ORTHO-1")).await?;

    let current = storage
        .get_box_by_code(&code("ORTHO-1"))
        .await
        .map_err(|e| format!("get_box_by_code: {e}"))?;
    if current.id != "b2" {
        return Err(format!("code should resolve to b2, got {}", current.id));
    }
    let retired = storage
        .get_box("b1")
        .await
        .map_err(|e| format!("get_box(b1): {e}"))?;
    if retired.active {
        return Err("b1 should remain inactive".to_string());
    }
    Ok(())
}

// ── Listing ──────────────────────────────────────────────────────────────────

async fn list_boxes_ordered_by_code<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "C-3")).await?;
    seed_box(&storage, make_box("b2", "A-1")).await?;
    seed_box(&storage, make_box("b3", "B-2")).await?;

    let codes: Vec<String> = storage
        .list_boxes(false)
        .await
        .map_err(|e| format!("list_boxes: {e}"))?
        .into_iter()
        .map(|b| b.code.to_string())
        .collect();
    if codes != ["A-1", "B-2", "C-3"] {
        return Err(format!("unexpected order: {codes:?}"));
    }
    Ok(())
}

async fn list_boxes_skips_inactive_by_default<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_box(&storage, make_box("b1", "A-1")).await?;
    let mut retired = make_box("b2", "B-2");
    retired.active = false;
    seed_box(&storage, retired).await?;

    let active = storage
        .list_boxes(false)
        .await
        .map_err(|e| format!("list_boxes(false): {e}"))?;
    if active.len() != 1 || active[0].id != "b1" {
        return Err(format!("expected only b1, got {} boxes", active.len()));
    }
    let all = storage
        .list_boxes(true)
        .await
        .map_err(|e| format!("list_boxes(true): {e}"))?;
    if all.len() != 2 {
        return Err(format!("expected 2 boxes with inactive, got {}", all.len()));
    }
    Ok(())
}
