use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use steriflow_engine::Workflow;
use steriflow_storage::MemoryStorage;
use tower::ServiceExt;

use super::{router, AppState};

fn app(api_key: Option<&str>) -> Router {
    router(Arc::new(AppState {
        workflow: Workflow::new(MemoryStorage::new()),
        api_key: api_key.map(str::to_string),
    }))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    actor: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-actor-id", actor);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, code: &str) -> String {
    let (status, body) = send(app, "POST", "/boxes", None, Some(json!({ "code": code }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn scan(app: &Router, code: &str, body: Value) -> (StatusCode, Value) {
    let mut body = body;
    body["code"] = json!(code);
    send(app, "POST", "/scan", Some("tech-1"), Some(body)).await
}

async fn scan_to_storage(app: &Router, code: &str) {
    for _ in 0..4 {
        let (status, _) = scan(app, code, json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = scan(app, code, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = scan(app, code, json!({ "validation_result": "passed" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = scan(app, code, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["box"]["current_step"], "storage");
}

#[tokio::test]
async fn health_is_ok() {
    let app = app(None);
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_then_fetch_by_id_and_code() {
    let app = app(None);
    let id = register(&app, "ortho-1").await;

    let (status, body) = send(&app, "GET", &format!("/boxes/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "ORTHO-1");
    assert_eq!(body["status"], "dirty");
    assert_eq!(body["current_step"], Value::Null);

    let (status, body) = send(&app, "GET", "/boxes?code=Ortho-1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_code_is_bad_request() {
    let app = app(None);
    register(&app, "A-1").await;
    let (status, body) = send(&app, "POST", "/boxes", None, Some(json!({ "code": "a-1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn scan_requires_actor_header() {
    let app = app(None);
    register(&app, "A-1").await;
    let (status, body) = send(&app, "POST", "/scan", None, Some(json!({ "code": "A-1" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthenticated");
}

#[tokio::test]
async fn scan_advances_and_returns_log_entry() {
    let app = app(None);
    register(&app, "A-1").await;
    let (status, body) = scan(&app, "a-1", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["box"]["current_step"], "reception");
    assert_eq!(body["box"]["status"], "dirty");
    assert_eq!(body["log"]["from_step"], Value::Null);
    assert_eq!(body["log"]["to_step"], "reception");
    assert_eq!(body["log"]["performed_by"], "tech-1");
}

#[tokio::test]
async fn leaving_sterilization_without_result_is_422() {
    let app = app(None);
    register(&app, "A-1").await;
    for _ in 0..5 {
        scan(&app, "A-1", json!({})).await;
    }
    let (status, body) = scan(&app, "A-1", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_required");
}

#[tokio::test]
async fn stale_expected_version_is_409() {
    let app = app(None);
    register(&app, "A-1").await;
    scan(&app, "A-1", json!({})).await;
    let (status, body) = scan(&app, "A-1", json!({ "expected_version": 0 })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "stale_state");
}

#[tokio::test]
async fn unknown_scan_field_is_rejected() {
    let app = app(None);
    register(&app, "A-1").await;
    let (status, _) = scan(&app, "A-1", json!({ "validation": "passed" })).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn assignment_lifecycle_over_http() {
    let app = app(None);
    let id = register(&app, "A-1").await;
    scan_to_storage(&app, "A-1").await;

    let (status, request) = send(
        &app,
        "POST",
        &format!("/boxes/{id}/request"),
        Some("secretary-1"),
        Some(json!({ "service_id": "cardio", "bloc": "bloc 4" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["status"], "requested");
    let assignment_id = request["id"].as_str().unwrap().to_string();

    let (status, assigned) = send(
        &app,
        "POST",
        &format!("/boxes/{id}/assign"),
        Some("nurse-1"),
        Some(json!({ "service_id": "cardio" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{assigned}");
    assert_eq!(assigned["id"], assignment_id.as_str());
    assert_eq!(assigned["status"], "assigned");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/assignments/{assignment_id}/confirm"),
        Some("nurse-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_use");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/assignments/{assignment_id}/return"),
        Some("porter-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["assignment"]["status"], "returned");
    assert_eq!(body["box"]["current_step"], "reception");
    assert_eq!(body["box"]["assigned_service_id"], Value::Null);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/assignments/{assignment_id}/return"),
        Some("porter-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
}

#[tokio::test]
async fn reset_accepts_optional_notes() {
    let app = app(None);
    let id = register(&app, "A-1").await;
    scan(&app, "A-1", json!({})).await;
    scan(&app, "A-1", json!({})).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/boxes/{id}/reset"),
        Some("nurse-1"),
        Some(json!({ "notes": "seal broken" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["log"]["from_step"], "pre_disinfection");
    assert_eq!(body["log"]["notes"], "seal broken");

    let (status, _) = send(&app, "POST", &format!("/boxes/{id}/reset"), Some("nurse-1"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn history_lists_newest_first_with_limit() {
    let app = app(None);
    let id = register(&app, "A-1").await;
    for _ in 0..3 {
        scan(&app, "A-1", json!({})).await;
    }
    let (status, body) = send(&app, "GET", &format!("/boxes/{id}/history?limit=2"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["to_step"], "cleaning");
    assert_eq!(entries[0]["actor_name"], "Unknown");
}

#[tokio::test]
async fn list_filters_by_status_and_rejects_unknown_status() {
    let app = app(None);
    register(&app, "A-1").await;
    register(&app, "B-1").await;
    scan(&app, "B-1", json!({})).await;
    scan(&app, "B-1", json!({})).await;

    let (status, body) = send(&app, "GET", "/boxes?status=cleaning", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let boxes = body.as_array().unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0]["code"], "B-1");

    let (status, body) = send(&app, "GET", "/boxes?status=shiny", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn expiring_report_lists_fresh_storage_within_window() {
    let app = app(None);
    register(&app, "A-1").await;
    scan_to_storage(&app, "A-1").await;

    let (status, body) = send(&app, "GET", "/reports/expiring?within_days=7", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = send(&app, "GET", "/reports/expiring?within_days=31", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn deactivate_hides_box() {
    let app = app(None);
    let id = register(&app, "A-1").await;
    let (status, body) = send(&app, "DELETE", &format!("/boxes/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, body) = send(&app, "GET", "/boxes?code=A-1", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn api_key_guards_everything_but_health() {
    let app = app(Some("s3cret"));
    let (status, _) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/boxes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/boxes")
        .header("x-api-key", "wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri("/boxes")
        .header("authorization", "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = app(None);
    let (status, body) = send(&app, "GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");
}

#[tokio::test]
async fn out_of_range_query_values_are_bad_requests() {
    let app = app(None);
    let id = register(&app, "A-1").await;
    scan(&app, "A-1", json!({})).await;

    let (status, body) = send(&app, "GET", &format!("/boxes/{id}/history?limit=0"), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = send(
        &app,
        "GET",
        "/reports/expiring?within_days=4294967295",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}
