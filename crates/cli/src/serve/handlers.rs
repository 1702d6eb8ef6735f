//! Route handlers. Each maps one request onto one workflow operation.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use steriflow_core::{BoxStatus, BoxView, SterilizationType, ValidationResult};
use steriflow_engine::{AdvanceOutcome, AdvanceRequest, IdentityContext};
use time::Duration;

use super::error::ApiError;
use super::middleware::HeaderIdentity;
use super::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Boxes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<String>,
    code: Option<String>,
}

/// GET /boxes?status=&code=
///
/// With `code`, the result holds at most the one active box using it.
pub(crate) async fn handle_list_boxes(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<BoxView>>> {
    let Query(query) = query?;
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<BoxStatus>()
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        ),
        None => None,
    };

    let boxes = match query.code.as_deref() {
        Some(code) => {
            let found = state.workflow.get_box(code).await?;
            if status.is_some_and(|s| s != found.status()) {
                Vec::new()
            } else {
                vec![found]
            }
        }
        None => state.workflow.list_boxes(status).await?,
    };
    Ok(Json(boxes.iter().map(BoxView::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RegisterBody {
    code: String,
    #[serde(default)]
    name: String,
    sterilization_type: Option<SterilizationType>,
}

/// POST /boxes
pub(crate) async fn handle_register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let b = state
        .workflow
        .register_box(&body.code, &body.name, body.sterilization_type)
        .await?;
    Ok((StatusCode::CREATED, Json(BoxView::from(&b))))
}

/// GET /boxes/{id}
pub(crate) async fn handle_get_box(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<BoxView>> {
    let b = state.workflow.get_box_by_id(&id).await?;
    Ok(Json(BoxView::from(&b)))
}

/// DELETE /boxes/{id}
pub(crate) async fn handle_deactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<BoxView>> {
    let b = state.workflow.deactivate_box(&id).await?;
    Ok(Json(BoxView::from(&b)))
}

// ── Cycle ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScanBody {
    code: String,
    validation_result: Option<ValidationResult>,
    sterilization_type: Option<SterilizationType>,
    notes: Option<String>,
    expected_version: Option<u64>,
}

/// POST /scan
pub(crate) async fn handle_scan(
    State(state): State<Arc<AppState>>,
    identity: HeaderIdentity,
    body: Result<Json<ScanBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(body) = body?;
    let actor = identity.require_actor()?;
    let request = AdvanceRequest {
        validation_result: body.validation_result,
        sterilization_type: body.sterilization_type,
        notes: body.notes,
        expected_version: body.expected_version,
    };
    let outcome = state.workflow.advance(&body.code, &actor, request).await?;
    Ok(Json(transition_json(&outcome)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct NotesBody {
    notes: Option<String>,
}

/// POST /boxes/{id}/reset
pub(crate) async fn handle_reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    identity: HeaderIdentity,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let body: NotesBody = optional_body(&body)?;
    let actor = identity.require_actor()?;
    let outcome = state
        .workflow
        .reset_to_reception(&id, &actor, body.notes.as_deref())
        .await?;
    Ok(Json(transition_json(&outcome)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<usize>,
}

/// GET /boxes/{id}/history?limit=
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let entries = state.workflow.history(&id, query.limit).await?;
    Ok(Json(entries))
}

// ── Assignments ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServiceBody {
    service_id: String,
    bloc: Option<String>,
}

/// POST /boxes/{id}/request
pub(crate) async fn handle_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    identity: HeaderIdentity,
    body: Result<Json<ServiceBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let actor = identity.require_actor()?;
    let assignment = state
        .workflow
        .request_box(&id, &body.service_id, body.bloc.as_deref(), &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// POST /boxes/{id}/assign
pub(crate) async fn handle_assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    identity: HeaderIdentity,
    body: Result<Json<ServiceBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let actor = identity.require_actor()?;
    let assignment = state
        .workflow
        .assign(&id, &body.service_id, body.bloc.as_deref(), &actor)
        .await?;
    Ok(Json(assignment))
}

/// POST /assignments/{id}/confirm
pub(crate) async fn handle_confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    identity: HeaderIdentity,
) -> ApiResult<impl IntoResponse> {
    let actor = identity.require_actor()?;
    let assignment = state.workflow.confirm_in_use(&id, &actor).await?;
    Ok(Json(assignment))
}

/// POST /assignments/{id}/return
pub(crate) async fn handle_return(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    identity: HeaderIdentity,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let body: NotesBody = optional_body(&body)?;
    let actor = identity.require_actor()?;
    let outcome = state
        .workflow
        .return_box(&id, &actor, body.notes.as_deref())
        .await?;
    Ok(Json(json!({
        "assignment": outcome.assignment,
        "box": BoxView::from(&outcome.instrument_box),
        "log": outcome.log,
    })))
}

// ── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct ExpiringQuery {
    within_days: Option<u32>,
}

const DEFAULT_EXPIRY_WINDOW_DAYS: u32 = 7;

/// GET /reports/expiring?within_days=
pub(crate) async fn handle_expiring(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ExpiringQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<BoxView>>> {
    let Query(query) = query?;
    let days = query.within_days.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);
    let boxes = state
        .workflow
        .expiring_boxes(Duration::days(i64::from(days)))
        .await?;
    Ok(Json(boxes.iter().map(BoxView::from).collect()))
}

fn transition_json(outcome: &AdvanceOutcome) -> serde_json::Value {
    json!({
        "box": BoxView::from(&outcome.instrument_box),
        "log": outcome.log,
    })
}

/// Parse a JSON body that may be omitted entirely.
fn optional_body<T: DeserializeOwned + Default>(bytes: &Bytes) -> ApiResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}
