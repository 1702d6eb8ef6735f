use serde_json::json;
use steriflow_engine::{AdvanceOutcome, AdvanceRequest, WorkflowError};

use super::{box_line, timestamp, view, Context};

pub(crate) async fn cmd_scan(
    ctx: &Context,
    code: &str,
    request: AdvanceRequest,
) -> Result<(), WorkflowError> {
    let actor = ctx.actor()?;
    let outcome = ctx.workflow.advance(code, &actor, request).await?;
    emit_transition(ctx, &outcome);
    Ok(())
}

pub(crate) async fn cmd_reset(
    ctx: &Context,
    code: &str,
    notes: Option<&str>,
) -> Result<(), WorkflowError> {
    let actor = ctx.actor()?;
    let b = ctx.workflow.get_box(code).await?;
    let outcome = ctx.workflow.reset_to_reception(&b.id, &actor, notes).await?;
    emit_transition(ctx, &outcome);
    Ok(())
}

fn emit_transition(ctx: &Context, outcome: &AdvanceOutcome) {
    let value = json!({
        "box": view(&outcome.instrument_box),
        "log": outcome.log,
    });
    ctx.emit(&value, || {
        let from = outcome.log.from_step.map_or("-", |s| s.as_str());
        let mut text = format!(
            "{} -> {}\n{}",
            from,
            outcome.log.to_step,
            box_line(&outcome.instrument_box)
        );
        if let Some(notes) = &outcome.log.notes {
            text.push_str(&format!("\nnote: {notes}"));
        }
        text
    });
}

pub(crate) async fn cmd_history(
    ctx: &Context,
    code: &str,
    limit: Option<usize>,
) -> Result<(), WorkflowError> {
    let b = ctx.workflow.get_box(code).await?;
    let entries = ctx.workflow.history(&b.id, limit).await?;
    ctx.emit(&entries, || {
        if entries.is_empty() {
            return format!("{} has no history", b.code);
        }
        entries
            .iter()
            .map(|h| {
                let e = &h.entry;
                let mut line = format!(
                    "{}  {:>16} -> {:<16} by {}",
                    timestamp(Some(e.created_at)),
                    e.from_step.map_or("-", |s| s.as_str()),
                    e.to_step.as_str(),
                    h.actor_name
                );
                if let Some(result) = e.validation_result {
                    line.push_str(&format!("  control={result}"));
                }
                if let Some(notes) = &e.notes {
                    line.push_str(&format!("  ({notes})"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    Ok(())
}
