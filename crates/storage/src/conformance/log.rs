//! Workflow log conformance tests: ordering, limits and sequencing.

use std::future::Future;

use steriflow_core::Step;

use super::{make_box, make_log_entry, seed_box, TestResult};
use crate::{StorageError, WorkflowStorage};

pub(super) async fn run_log_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "log",
        "entries_listed_newest_first",
        entries_listed_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "equal_timestamps_ordered_by_sequence",
        equal_timestamps_ordered_by_sequence(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "limit_caps_results",
        limit_caps_results(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "entries_scoped_to_box",
        entries_scoped_to_box(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "duplicate_entry_id_rejected",
        duplicate_entry_id_rejected(factory).await,
    ));

    results
}

async fn append_committed<S: WorkflowStorage>(
    s: &S,
    id: &str,
    box_id: &str,
    to_step: Step,
    minutes: i64,
) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_log_entry(
        &mut snap,
        make_log_entry(id, box_id, None, to_step, minutes),
    )
    .await
    .map_err(|e| format!("append {id}: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())
}

async fn entries_listed_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    append_committed(&s, "l-old", "b1", Step::Reception, 0).await?;
    append_committed(&s, "l-new", "b1", Step::Cleaning, 20).await?;
    append_committed(&s, "l-mid", "b1", Step::PreDisinfection, 10).await?;

    let ids: Vec<String> = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|e| e.id)
        .collect();
    if ids != ["l-new", "l-mid", "l-old"] {
        return Err(format!("unexpected order: {ids:?}"));
    }
    Ok(())
}

async fn equal_timestamps_ordered_by_sequence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;

    // Two entries in one snapshot share a timestamp (a failed control and
    // its restart, for instance). Append order must survive.
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let first = s
        .append_log_entry(
            &mut snap,
            make_log_entry("l1", "b1", Some(Step::Sterilization), Step::Control, 5),
        )
        .await
        .map_err(|e| e.to_string())?;
    let second = s
        .append_log_entry(
            &mut snap,
            make_log_entry("l2", "b1", Some(Step::Control), Step::Reception, 5),
        )
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if second.sequence <= first.sequence {
        return Err(format!(
            "sequence not increasing: {} then {}",
            first.sequence, second.sequence
        ));
    }
    let ids: Vec<String> = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|e| e.id)
        .collect();
    if ids != ["l2", "l1"] {
        return Err(format!("unexpected order: {ids:?}"));
    }
    Ok(())
}

async fn limit_caps_results<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    for i in 0..5 {
        append_committed(&s, &format!("l{i}"), "b1", Step::Reception, i).await?;
    }

    let limited = s
        .list_log_entries("b1", 2)
        .await
        .map_err(|e| e.to_string())?;
    if limited.len() != 2 || limited[0].id != "l4" || limited[1].id != "l3" {
        let ids: Vec<&str> = limited.iter().map(|e| e.id.as_str()).collect();
        return Err(format!("expected [l4, l3], got {ids:?}"));
    }
    let all = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    if all.len() != 5 {
        return Err(format!("limit 0 should return all 5, got {}", all.len()));
    }
    Ok(())
}

async fn entries_scoped_to_box<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    seed_box(&s, make_box("b2", "A-2")).await?;
    append_committed(&s, "l1", "b1", Step::Reception, 0).await?;
    append_committed(&s, "l2", "b2", Step::Reception, 1).await?;

    let log = s
        .list_log_entries("b1", 0)
        .await
        .map_err(|e| e.to_string())?;
    if log.len() != 1 || log[0].box_id != "b1" {
        return Err(format!("expected only b1's entry, got {}", log.len()));
    }
    Ok(())
}

async fn duplicate_entry_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    append_committed(&s, "l1", "b1", Step::Reception, 0).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .append_log_entry(
            &mut snap,
            make_log_entry("l1", "b1", None, Step::PreDisinfection, 1),
        )
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {e}")),
        Ok(_) => Err("log entry id reused".to_string()),
    }
}
