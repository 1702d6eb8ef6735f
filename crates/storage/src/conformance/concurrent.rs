use std::future::Future;
use std::sync::Arc;

use steriflow_core::Step;

use super::{make_box, make_log_entry, seed_box, TestResult};
use crate::{StorageError, WorkflowStorage};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_exactly_one_wins",
        concurrent_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_registration_exactly_one_wins",
        concurrent_registration_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_boxes_all_succeed",
        concurrent_updates_different_boxes_all_succeed(factory).await,
    ));

    results
}

/// One task's attempt to move `box_id` from version 0 to pre-disinfection, with its
/// log entry. `Ok(true)` if it won, `Ok(false)` on a conflict.
async fn try_advance<S: WorkflowStorage>(
    s: Arc<S>,
    box_id: String,
    i: usize,
) -> Result<bool, StorageError> {
    let mut snap = s.begin_snapshot().await?;
    let mut b = s.get_box_for_update(&mut snap, &box_id).await?;
    b.current_step = Some(Step::PreDisinfection);
    b.name = format!("written by task {i}");
    if let Err(e) = s.update_box(&mut snap, &b, 0).await {
        let _ = s.abort_snapshot(snap).await;
        return match e {
            StorageError::ConcurrentConflict { .. } => Ok(false),
            other => Err(other),
        };
    }
    s.append_log_entry(
        &mut snap,
        make_log_entry(
            &format!("log-{box_id}-{i}"),
            &box_id,
            Some(Step::Reception),
            Step::PreDisinfection,
            i as i64,
        ),
    )
    .await?;
    match s.commit_snapshot(snap).await {
        Ok(()) => Ok(true),
        Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks each open a snapshot and attempt to advance the same box from
/// version 0. Exactly one commit succeeds; the rest must see
/// ConcurrentConflict, either from `update_box` or from the commit.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_box(storage.as_ref(), make_box("b1", "A-1")).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(try_advance(s, "b1".to_string(), i)));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    // Final state: version 1 and exactly one log entry.
    let b = storage.get_box("b1").await.map_err(|e| e.to_string())?;
    if b.version != 1 || b.current_step != Some(Step::PreDisinfection) {
        return Err(format!(
            "expected pre_disinfection at version 1, got {:?} v{}",
            b.current_step, b.version
        ));
    }
    let log = storage
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    if log.len() != 1 {
        return Err(format!("expected 1 log entry, got {}", log.len()));
    }
    Ok(())
}

// ── Concurrent registration: exactly one wins ───────────────────────────────

/// N tasks each try to register a box with the same code. Exactly one
/// succeeds; the rest must see DuplicateBoxCode.
async fn concurrent_registration_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = s
                .insert_box(&mut snap, make_box(&format!("b{i}"), "SHARED-1"))
                .await;
            let result = match result {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            };
            match result {
                Ok(()) => Ok(true),
                Err(StorageError::DuplicateBoxCode { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    let boxes = storage.list_boxes(true).await.map_err(|e| e.to_string())?;
    if boxes.len() != 1 {
        return Err(format!("expected 1 stored box, got {}", boxes.len()));
    }
    Ok(())
}

// ── Concurrent updates to different boxes: all succeed ──────────────────────

/// N tasks each advance a different box. All should succeed; no false
/// conflicts when there is no contention.
async fn concurrent_updates_different_boxes_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        seed_box(storage.as_ref(), make_box(&format!("b{i}"), &format!("SET-{i}"))).await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(try_advance(s, format!("b{i}"), i)));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let won = handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
        if !won {
            return Err(format!("task {i} saw a false conflict"));
        }
    }

    for i in 0..N {
        let b = storage
            .get_box(&format!("b{i}"))
            .await
            .map_err(|e| format!("get b{i}: {e}"))?;
        if b.version != 1 {
            return Err(format!("b{i}: expected version 1, got {}", b.version));
        }
    }
    Ok(())
}
