//! Tracing subscriber setup. Logs go to stderr so command output on stdout
//! stays machine readable.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
///
/// `quiet` lowers the default to warnings for one-shot commands.
pub(crate) fn init_tracing(config: &LoggingConfig, quiet: bool) {
    let level = if quiet { "warn" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn default_directive(level: &str) -> String {
    format!(
        "steriflow={level},steriflow_engine={level},steriflow_storage={level},tower_http={level},warn"
    )
}
