//! One-shot subcommands. Each opens the store, runs one workflow
//! operation and prints the result.

pub(crate) mod assignment;
pub(crate) mod boxes;
pub(crate) mod cycle;

use serde::Serialize;
use steriflow_core::{BoxView, InstrumentBox};
use steriflow_engine::{IdentityContext, StaticIdentity, Workflow, WorkflowError};
use steriflow_storage::MemoryStorage;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::SteriflowConfig;
use crate::OutputFormat;

pub(crate) struct Context {
    pub(crate) workflow: Workflow<MemoryStorage>,
    identity: StaticIdentity,
    output: OutputFormat,
    quiet: bool,
}

impl Context {
    pub(crate) async fn open(
        config: &SteriflowConfig,
        actor: Option<String>,
        output: OutputFormat,
        quiet: bool,
    ) -> Result<Self, WorkflowError> {
        let storage = MemoryStorage::open(&config.storage.path).await?;
        let workflow = Workflow::new(storage).with_config(config.workflow.clone());
        let identity =
            StaticIdentity::new(actor.or_else(|| config.operator.default_actor.clone()));
        Ok(Self {
            workflow,
            identity,
            output,
            quiet,
        })
    }

    /// The actor from `--actor` or `operator.default_actor`.
    pub(crate) fn actor(&self) -> Result<String, WorkflowError> {
        self.identity.require_actor()
    }

    /// Print `value` as JSON, or the text rendering in text mode.
    pub(crate) fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        if self.quiet {
            return;
        }
        match self.output {
            OutputFormat::Json => {
                let pretty = serde_json::to_string_pretty(value)
                    .unwrap_or_else(|e| format!("serialization error: {}", e));
                println!("{}", pretty);
            }
            OutputFormat::Text => println!("{}", text()),
        }
    }
}

pub(crate) fn box_line(b: &InstrumentBox) -> String {
    let step = b.current_step.map_or("-", |s| s.as_str());
    let mut line = format!(
        "{:<12} {:<24} step={:<16} v{}",
        b.code.as_str(),
        b.status().as_str(),
        step,
        b.version
    );
    if let Some(service) = &b.assigned_service_id {
        line.push_str(&format!("  assigned={service}"));
        if let Some(bloc) = &b.assigned_bloc {
            line.push_str(&format!(" ({bloc})"));
        }
    }
    line
}

pub(crate) fn view(b: &InstrumentBox) -> BoxView {
    BoxView::from(b)
}

pub(crate) fn timestamp(at: Option<OffsetDateTime>) -> String {
    at.and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}
