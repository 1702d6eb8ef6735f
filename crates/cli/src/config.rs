//! Layered configuration for the `steriflow` binary.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/steriflow/steriflow.toml`
//! 3. `./steriflow.toml`
//! 4. The file given with `--config`
//! 5. `STERIFLOW_*` environment variables
//!
//! Missing files are skipped. Unknown keys are rejected in every section.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use steriflow_engine::WorkflowConfig;

const SYSTEM_CONFIG: &str = "/etc/steriflow/steriflow.toml";
const LOCAL_CONFIG: &str = "steriflow.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SteriflowConfig {
    pub(crate) storage: StorageConfig,
    pub(crate) workflow: WorkflowConfig,
    pub(crate) server: ServerConfig,
    pub(crate) operator: OperatorConfig,
    pub(crate) logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StorageConfig {
    /// JSON store file. Created on the first commit.
    pub(crate) path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("steriflow.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) bind_address: String,
    pub(crate) port: u16,
    /// When set, every route except `/health` requires this key.
    pub(crate) api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct OperatorConfig {
    /// Actor recorded by CLI commands run without `--actor`.
    pub(crate) default_actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LoggingConfig {
    /// Filter directive for steriflow crates; `RUST_LOG` takes precedence.
    pub(crate) level: String,
    pub(crate) json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SteriflowConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        self.workflow.validate()?;
        if self.storage.path.as_os_str().is_empty() {
            return Err("storage.path must not be empty".to_string());
        }
        if self.server.bind_address.trim().is_empty() {
            return Err("server.bind_address must not be empty".to_string());
        }
        if matches!(&self.server.api_key, Some(k) if k.trim().is_empty()) {
            return Err("server.api_key must not be blank; remove it to disable auth".to_string());
        }
        Ok(())
    }
}

/// Load the full hierarchy, then validate it.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<SteriflowConfig, String> {
    let config: SteriflowConfig = build_figment(explicit)
        .extract()
        .map_err(|e| format!("invalid configuration: {e}"))?;
    config.validate()?;
    Ok(config)
}

fn build_figment(explicit: Option<&Path>) -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(SteriflowConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(LOCAL_CONFIG));
    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// `STERIFLOW_WORKFLOW_HISTORY_LIMIT` -> `workflow.history_limit`.
///
/// Only the section prefix is turned into a dot; key names keep their
/// underscores.
fn env_provider() -> Env {
    Env::prefixed("STERIFLOW_").map(|key| {
        let key = key.as_str();
        let mapped = ["storage_", "workflow_", "server_", "operator_", "logging_"]
            .iter()
            .find_map(|section| {
                key.strip_prefix(section)
                    .map(|rest| format!("{}.{rest}", &section[..section.len() - 1]))
            })
            .unwrap_or_else(|| key.to_string());
        mapped.into()
    })
}
