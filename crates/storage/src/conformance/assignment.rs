use std::future::Future;

use steriflow_core::{AssignmentStatus, Profile};

use super::{make_assignment, make_box, seed_box, TestResult};
use crate::{StorageError, WorkflowStorage};

pub(super) async fn run_assignment_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "assignment",
        "open_assignment_found",
        open_assignment_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "assignment",
        "returned_assignment_not_open",
        returned_assignment_not_open(factory).await,
    ));
    results.push(TestResult::from_result(
        "assignment",
        "assignments_listed_oldest_first",
        assignments_listed_oldest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "assignment",
        "duplicate_assignment_id_rejected",
        duplicate_assignment_id_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "assignment",
        "get_profiles_returns_known_subset",
        get_profiles_returns_known_subset(factory).await,
    ));

    results
}

async fn insert_committed<S: WorkflowStorage>(
    s: &S,
    record: steriflow_core::BoxAssignment,
) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_assignment(&mut snap, record)
        .await
        .map_err(|e| format!("insert_assignment: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())
}

async fn open_assignment_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    insert_committed(&s, make_assignment("a1", "b1", "cardio", 0)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let open = s
        .find_open_assignment_for_update(&mut snap, "b1")
        .await
        .map_err(|e| e.to_string())?;
    let none = s
        .find_open_assignment_for_update(&mut snap, "b2")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    match open {
        Some(a) if a.id == "a1" => {}
        other => return Err(format!("expected open assignment a1, got {other:?}")),
    }
    if none.is_some() {
        return Err("unrelated box reported an open assignment".to_string());
    }
    Ok(())
}

async fn returned_assignment_not_open<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    insert_committed(&s, make_assignment("a1", "b1", "cardio", 0)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut a = s
        .get_assignment_for_update(&mut snap, "a1")
        .await
        .map_err(|e| e.to_string())?;
    a.status = AssignmentStatus::Returned;
    a.returned_by = Some("actor-2".to_string());
    s.update_assignment(&mut snap, &a)
        .await
        .map_err(|e| format!("update_assignment: {e}"))?;
    let still_open = s
        .find_open_assignment_for_update(&mut snap, "b1")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if still_open.is_some() {
        return Err("returned assignment still reported open in snapshot".to_string());
    }
    let stored = s.get_assignment("a1").await.map_err(|e| e.to_string())?;
    if stored.status != AssignmentStatus::Returned
        || stored.returned_by.as_deref() != Some("actor-2")
    {
        return Err(format!("return not committed: {stored:?}"));
    }
    Ok(())
}

async fn assignments_listed_oldest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    let mut first = make_assignment("a-z", "b1", "cardio", 0);
    first.status = AssignmentStatus::Returned;
    insert_committed(&s, first).await?;
    insert_committed(&s, make_assignment("a-a", "b1", "ortho", 60)).await?;

    let ids: Vec<String> = s
        .list_assignments("b1")
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|a| a.id)
        .collect();
    if ids != ["a-z", "a-a"] {
        return Err(format!("unexpected order: {ids:?}"));
    }
    Ok(())
}

async fn duplicate_assignment_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_box(&s, make_box("b1", "A-1")).await?;
    insert_committed(&s, make_assignment("a1", "b1", "cardio", 0)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .insert_assignment(&mut snap, make_assignment("a1", "b1", "ortho", 1))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists {
            kind: "assignment", ..
        }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists(assignment), got {e}")),
        Ok(()) => Err("assignment id reused".to_string()),
    }
}

async fn get_profiles_returns_known_subset<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for (id, name) in [("u1", "Ada"), ("u2", "Grace")] {
        s.upsert_profile(
            &mut snap,
            Profile {
                actor_id: id.to_string(),
                full_name: name.to_string(),
            },
        )
        .await
        .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut names: Vec<String> = s
        .get_profiles(&["u2".to_string(), "ghost".to_string(), "u1".to_string()])
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|p| p.full_name)
        .collect();
    names.sort();
    if names != ["Ada", "Grace"] {
        return Err(format!("unexpected profiles: {names:?}"));
    }
    Ok(())
}
