use serde_json::json;
use steriflow_core::BoxAssignment;
use steriflow_engine::WorkflowError;

use super::{box_line, view, Context};

pub(crate) async fn cmd_request(
    ctx: &Context,
    code: &str,
    service: &str,
    bloc: Option<&str>,
) -> Result<(), WorkflowError> {
    let actor = ctx.actor()?;
    let b = ctx.workflow.get_box(code).await?;
    let a = ctx.workflow.request_box(&b.id, service, bloc, &actor).await?;
    ctx.emit(&a, || {
        format!("{} requested by {} (assignment {})", b.code, a.service_id, a.id)
    });
    Ok(())
}

pub(crate) async fn cmd_assign(
    ctx: &Context,
    code: &str,
    service: &str,
    bloc: Option<&str>,
) -> Result<(), WorkflowError> {
    let actor = ctx.actor()?;
    let b = ctx.workflow.get_box(code).await?;
    let a = ctx.workflow.assign(&b.id, service, bloc, &actor).await?;
    ctx.emit(&a, || describe(b.code.as_str(), &a));
    Ok(())
}

pub(crate) async fn cmd_confirm(ctx: &Context, assignment_id: &str) -> Result<(), WorkflowError> {
    let actor = ctx.actor()?;
    let a = ctx.workflow.confirm_in_use(assignment_id, &actor).await?;
    ctx.emit(&a, || format!("assignment {} is {}", a.id, a.status));
    Ok(())
}

pub(crate) async fn cmd_return(
    ctx: &Context,
    assignment_id: &str,
    notes: Option<&str>,
) -> Result<(), WorkflowError> {
    let actor = ctx.actor()?;
    let outcome = ctx.workflow.return_box(assignment_id, &actor, notes).await?;
    let value = json!({
        "assignment": outcome.assignment,
        "box": view(&outcome.instrument_box),
        "log": outcome.log,
    });
    ctx.emit(&value, || {
        format!(
            "returned {}\n{}",
            outcome.assignment.id,
            box_line(&outcome.instrument_box)
        )
    });
    Ok(())
}

fn describe(code: &str, a: &BoxAssignment) -> String {
    match &a.bloc {
        Some(bloc) => format!("{code} assigned to {} ({bloc}), assignment {}", a.service_id, a.id),
        None => format!("{code} assigned to {}, assignment {}", a.service_id, a.id),
    }
}
