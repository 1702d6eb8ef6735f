mod commands;
mod config;
mod logging;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use steriflow_core::{BoxStatus, SterilizationType, ValidationResult};
use steriflow_engine::WorkflowError;

use crate::commands::Context;
use crate::config::SteriflowConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Instrument box sterilization workflow.
#[derive(Parser)]
#[command(
    name = "steriflow",
    version,
    about = "Instrument box sterilization workflow"
)]
struct Cli {
    /// Configuration file merged over the standard locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store file (overrides storage.path)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Actor recorded on the operation (overrides operator.default_actor)
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new instrument box
    Register {
        /// Box code as printed on its label
        code: String,
        /// Display name (defaults to the code)
        #[arg(long, default_value = "")]
        name: String,
        /// Sterilization method usually applied to this box
        #[arg(long)]
        method: Option<SterilizationType>,
    },

    /// Advance a scanned box to its next step
    Scan {
        /// Scanned box code
        code: String,
        /// Control result, required when leaving sterilization (passed or failed)
        #[arg(long)]
        result: Option<ValidationResult>,
        /// Sterilization method used
        #[arg(long)]
        method: Option<SterilizationType>,
        #[arg(long)]
        notes: Option<String>,
        /// Fail instead of advancing if the box is no longer at this version
        #[arg(long)]
        expected_version: Option<u64>,
    },

    /// Send a box back to reception from any step
    Reset {
        code: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Request a sterile box for a service
    Request {
        code: String,
        #[arg(long)]
        service: String,
        /// Operating block or room inside the service
        #[arg(long)]
        bloc: Option<String>,
    },

    /// Assign a sterile box to a service (moves it to distribution)
    Assign {
        code: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        bloc: Option<String>,
    },

    /// Confirm an assigned box is in use
    Confirm {
        assignment_id: String,
    },

    /// Return an assigned box; it goes back to reception
    Return {
        assignment_id: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show a box and its assignments
    Show {
        code: String,
    },

    /// List active boxes
    List {
        /// Only boxes with this status
        #[arg(long)]
        status: Option<BoxStatus>,
    },

    /// Show the workflow log of a box, newest first
    History {
        code: String,
        /// Number of entries (defaults to workflow.history_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List sterile boxes whose validity ends soon
    Expiring {
        #[arg(long, default_value = "7")]
        within_days: u32,
    },

    /// Retire a box; its history is kept
    Deactivate {
        code: String,
    },

    /// Manage operator display names
    Operator {
        #[command(subcommand)]
        command: OperatorCommands,
    },

    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
        /// Address to bind (overrides server.bind_address)
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum OperatorCommands {
    /// Record or rename an operator
    Add { actor_id: String, full_name: String },
}

fn main() {
    let Cli {
        config: config_path,
        data,
        actor,
        output,
        quiet,
        command,
    } = Cli::parse();

    let mut config = match config::load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, None, output, quiet);
            process::exit(1);
        }
    };
    if let Some(path) = data {
        config.storage.path = path;
    }

    let serving = matches!(command, Commands::Serve { .. });
    logging::init_tracing(&config.logging, quiet && !serving);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let msg = format!("failed to create tokio runtime: {e}");
            report_error(&msg, None, output, quiet);
            process::exit(1);
        }
    };

    let command = match command {
        Commands::Serve { port, bind } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                report_error(&format!("server error: {e}"), None, output, quiet);
                process::exit(1);
            }
            return;
        }
        other => other,
    };

    if let Err(e) = rt.block_on(run(&config, actor, output, quiet, command)) {
        report_error(&e.to_string(), Some(e.kind()), output, quiet);
        process::exit(1);
    }
}

async fn run(
    config: &SteriflowConfig,
    actor: Option<String>,
    output: OutputFormat,
    quiet: bool,
    command: Commands,
) -> Result<(), WorkflowError> {
    let ctx = Context::open(config, actor, output, quiet).await?;
    dispatch(&ctx, command).await
}

async fn dispatch(ctx: &Context, command: Commands) -> Result<(), WorkflowError> {
    match command {
        Commands::Register { code, name, method } => {
            commands::boxes::cmd_register(ctx, &code, &name, method).await
        }
        Commands::Scan {
            code,
            result,
            method,
            notes,
            expected_version,
        } => {
            let request = steriflow_engine::AdvanceRequest {
                validation_result: result,
                sterilization_type: method,
                notes,
                expected_version,
            };
            commands::cycle::cmd_scan(ctx, &code, request).await
        }
        Commands::Reset { code, notes } => {
            commands::cycle::cmd_reset(ctx, &code, notes.as_deref()).await
        }
        Commands::Request {
            code,
            service,
            bloc,
        } => commands::assignment::cmd_request(ctx, &code, &service, bloc.as_deref()).await,
        Commands::Assign {
            code,
            service,
            bloc,
        } => commands::assignment::cmd_assign(ctx, &code, &service, bloc.as_deref()).await,
        Commands::Confirm { assignment_id } => {
            commands::assignment::cmd_confirm(ctx, &assignment_id).await
        }
        Commands::Return {
            assignment_id,
            notes,
        } => commands::assignment::cmd_return(ctx, &assignment_id, notes.as_deref()).await,
        Commands::Show { code } => commands::boxes::cmd_show(ctx, &code).await,
        Commands::List { status } => commands::boxes::cmd_list(ctx, status).await,
        Commands::History { code, limit } => commands::cycle::cmd_history(ctx, &code, limit).await,
        Commands::Expiring { within_days } => {
            commands::boxes::cmd_expiring(ctx, within_days).await
        }
        Commands::Deactivate { code } => commands::boxes::cmd_deactivate(ctx, &code).await,
        Commands::Operator {
            command: OperatorCommands::Add {
                actor_id,
                full_name,
            },
        } => commands::boxes::cmd_operator_add(ctx, &actor_id, &full_name).await,
        Commands::Serve { .. } => Ok(()),
    }
}

/// Print an error on stderr, as text or as a JSON object.
pub(crate) fn report_error(msg: &str, kind: Option<&str>, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            let body = match kind {
                Some(kind) => serde_json::json!({ "error": msg, "kind": kind }),
                None => serde_json::json!({ "error": msg }),
            };
            eprintln!("{}", body);
        }
    }
}
