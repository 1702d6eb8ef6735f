//! Application state shared across request handlers.

use steriflow_engine::Workflow;
use steriflow_storage::MemoryStorage;

pub(crate) struct AppState {
    pub(crate) workflow: Workflow<MemoryStorage>,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}
