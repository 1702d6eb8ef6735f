use std::future::Future;

use super::{code, make_assignment, make_box, TestResult};
use crate::{StorageError, WorkflowStorage};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_box_nonexistent",
        get_box_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_box_by_code_nonexistent",
        get_box_by_code_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_box_for_update_nonexistent",
        get_box_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_box_nonexistent",
        update_box_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_assignment_nonexistent",
        get_assignment_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_assignment_nonexistent",
        update_assignment_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "empty_queries_return_empty_lists",
        empty_queries_return_empty_lists(factory).await,
    ));

    results
}

async fn get_box_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_box("missing").await {
        Err(StorageError::BoxNotFound { key }) if key == "missing" => Ok(()),
        Err(e) => Err(format!("expected BoxNotFound(missing), got {e}")),
        Ok(_) => Err("expected BoxNotFound, got Ok".to_string()),
    }
}

async fn get_box_by_code_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_box_by_code(&code("NOPE-1")).await {
        Err(StorageError::BoxNotFound { key }) if key == "NOPE-1" => Ok(()),
        Err(e) => Err(format!("expected BoxNotFound(NOPE-1), got {e}")),
        Ok(_) => Err("expected BoxNotFound, got Ok".to_string()),
    }
}

async fn get_box_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage.get_box_for_update(&mut snap, "missing").await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::BoxNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected BoxNotFound, got {e}")),
        Ok(_) => Err("expected BoxNotFound, got Ok".to_string()),
    }
}

async fn update_box_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .update_box(&mut snap, &make_box("ghost", "GHOST-1"), 0)
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::BoxNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected BoxNotFound, got {e}")),
        Ok(v) => Err(format!("expected BoxNotFound, got Ok({v})")),
    }
}

async fn get_assignment_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_assignment("a-missing").await {
        Err(StorageError::AssignmentNotFound { assignment_id }) if assignment_id == "a-missing" => {
            Ok(())
        }
        Err(e) => Err(format!("expected AssignmentNotFound, got {e}")),
        Ok(_) => Err("expected AssignmentNotFound, got Ok".to_string()),
    }
}

async fn update_assignment_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .update_assignment(&mut snap, &make_assignment("a-missing", "b1", "svc", 0))
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AssignmentNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected AssignmentNotFound, got {e}")),
        Ok(()) => Err("expected AssignmentNotFound, got Ok".to_string()),
    }
}

async fn empty_queries_return_empty_lists<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let log = storage
        .list_log_entries("missing", 0)
        .await
        .map_err(|e| format!("list_log_entries: {e}"))?;
    let assignments = storage
        .list_assignments("missing")
        .await
        .map_err(|e| format!("list_assignments: {e}"))?;
    let profiles = storage
        .get_profiles(&["nobody".to_string()])
        .await
        .map_err(|e| format!("get_profiles: {e}"))?;
    let boxes = storage
        .list_boxes(true)
        .await
        .map_err(|e| format!("list_boxes: {e}"))?;
    if !log.is_empty() || !assignments.is_empty() || !profiles.is_empty() || !boxes.is_empty() {
        return Err("empty store returned records".to_string());
    }
    Ok(())
}
