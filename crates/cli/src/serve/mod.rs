//! `steriflow serve` -- HTTP JSON API over the sterilization workflow.
//!
//! One `Workflow` is shared by every request; each request runs one
//! workflow operation in its own storage snapshot.
//!
//! Security features:
//! - CORS headers on all responses
//! - Optional API key authentication via `server.api_key`
//! - Mutating cycle and assignment routes require an `X-Actor-Id` header
//!
//! Endpoints:
//! - GET    /health                       - Server status (exempt from auth)
//! - GET    /boxes?status=&code=          - List boxes / look one up by code
//! - POST   /boxes                        - Register a box
//! - GET    /boxes/{id}                   - Box by id
//! - DELETE /boxes/{id}                   - Deactivate a box
//! - POST   /scan                         - Advance the scanned box
//! - POST   /boxes/{id}/reset             - Send a box back to reception
//! - GET    /boxes/{id}/history?limit=    - Workflow log, newest first
//! - POST   /boxes/{id}/request           - Request a sterile box
//! - POST   /boxes/{id}/assign            - Assign a sterile box to a service
//! - POST   /assignments/{id}/confirm     - Confirm an assigned box is in use
//! - POST   /assignments/{id}/return      - Return a box from use
//! - GET    /reports/expiring?within_days= - Sterile boxes expiring soon
//!
//! All responses use Content-Type: application/json.

mod error;
mod handlers;
mod middleware;
mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use steriflow_engine::Workflow;
use steriflow_storage::MemoryStorage;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::handlers::{
    handle_assign, handle_confirm, handle_deactivate, handle_expiring, handle_get_box,
    handle_health, handle_history, handle_list_boxes, handle_not_found, handle_register,
    handle_request, handle_reset, handle_return, handle_scan,
};
use self::middleware::auth_middleware;
pub(crate) use self::state::AppState;
use crate::config::SteriflowConfig;

/// Maximum request body size: 64 KB.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Open the configured store and serve until Ctrl+C.
pub async fn start_server(config: SteriflowConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storage = MemoryStorage::open(&config.storage.path).await?;
    tracing::info!(path = %config.storage.path.display(), "store opened");

    let workflow = Workflow::new(storage).with_config(config.workflow.clone());
    let api_key = config.server.api_key.clone();
    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }

    let state = Arc::new(AppState { workflow, api_key });
    let app = router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "steriflow listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// The API routes with their middleware stack.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/boxes", get(handle_list_boxes).post(handle_register))
        .route("/boxes/{id}", get(handle_get_box).delete(handle_deactivate))
        .route("/scan", post(handle_scan))
        .route("/boxes/{id}/reset", post(handle_reset))
        .route("/boxes/{id}/history", get(handle_history))
        .route("/boxes/{id}/request", post(handle_request))
        .route("/boxes/{id}/assign", post(handle_assign))
        .route("/assignments/{id}/confirm", post(handle_confirm))
        .route("/assignments/{id}/return", post(handle_return))
        .route("/reports/expiring", get(handle_expiring))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
