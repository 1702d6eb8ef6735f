use serde::Serialize;
use steriflow_core::{BoxAssignment, BoxStatus, BoxView, SterilizationType};
use steriflow_engine::WorkflowError;
use time::Duration;

use super::{box_line, timestamp, view, Context};

pub(crate) async fn cmd_register(
    ctx: &Context,
    code: &str,
    name: &str,
    method: Option<SterilizationType>,
) -> Result<(), WorkflowError> {
    let b = ctx.workflow.register_box(code, name, method).await?;
    ctx.emit(&view(&b), || format!("registered {} ({}) id={}", b.code, b.name, b.id));
    Ok(())
}

#[derive(Serialize)]
struct BoxDetail {
    #[serde(rename = "box")]
    instrument_box: BoxView,
    assignments: Vec<BoxAssignment>,
}

pub(crate) async fn cmd_show(ctx: &Context, code: &str) -> Result<(), WorkflowError> {
    let b = ctx.workflow.get_box(code).await?;
    let assignments = ctx.workflow.list_assignments(&b.id).await?;

    ctx.emit(
        &BoxDetail {
            instrument_box: view(&b),
            assignments: assignments.clone(),
        },
        || {
            let mut lines = vec![
                box_line(&b),
                format!("  id:             {}", b.id),
                format!("  name:           {}", b.name),
                format!(
                    "  method:         {}",
                    b.sterilization_type.map_or("-", |m| m.as_str())
                ),
                format!("  sterilized at:  {}", timestamp(b.last_sterilized_at)),
                format!("  valid until:    {}", timestamp(b.next_sterilization_due)),
            ];
            for a in &assignments {
                lines.push(format!(
                    "  assignment {} {} for {}{}",
                    a.id,
                    a.status,
                    a.service_id,
                    a.bloc.as_deref().map(|bloc| format!(" ({bloc})")).unwrap_or_default()
                ));
            }
            lines.join("\n")
        },
    );
    Ok(())
}

pub(crate) async fn cmd_list(ctx: &Context, status: Option<BoxStatus>) -> Result<(), WorkflowError> {
    let boxes = ctx.workflow.list_boxes(status).await?;
    let views: Vec<BoxView> = boxes.iter().map(view).collect();
    ctx.emit(&views, || {
        if boxes.is_empty() {
            return "no boxes".to_string();
        }
        boxes.iter().map(box_line).collect::<Vec<_>>().join("\n")
    });
    Ok(())
}

pub(crate) async fn cmd_expiring(ctx: &Context, within_days: u32) -> Result<(), WorkflowError> {
    let boxes = ctx
        .workflow
        .expiring_boxes(Duration::days(i64::from(within_days)))
        .await?;
    let views: Vec<BoxView> = boxes.iter().map(view).collect();
    ctx.emit(&views, || {
        if boxes.is_empty() {
            return format!("no sterile box expires within {within_days} days");
        }
        boxes
            .iter()
            .map(|b| format!("{}  due {}", box_line(b), timestamp(b.next_sterilization_due)))
            .collect::<Vec<_>>()
            .join("\n")
    });
    Ok(())
}

pub(crate) async fn cmd_deactivate(ctx: &Context, code: &str) -> Result<(), WorkflowError> {
    let b = ctx.workflow.get_box(code).await?;
    let retired = ctx.workflow.deactivate_box(&b.id).await?;
    ctx.emit(&view(&retired), || format!("deactivated {}", retired.code));
    Ok(())
}

pub(crate) async fn cmd_operator_add(
    ctx: &Context,
    actor_id: &str,
    full_name: &str,
) -> Result<(), WorkflowError> {
    let profile = ctx.workflow.add_operator(actor_id, full_name).await?;
    ctx.emit(&profile, || {
        format!("operator {} is {}", profile.actor_id, profile.full_name)
    });
    Ok(())
}
