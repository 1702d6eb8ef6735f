//! HTTP middleware and extractors: API key authentication and the acting
//! operator.

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use steriflow_engine::IdentityContext;

use super::error::ApiError;
use super::state::AppState;

/// Header naming the operator performing a mutating request.
pub(crate) const ACTOR_HEADER: &str = "x-actor-id";

/// API key authentication middleware.
///
/// If `server.api_key` is set, all requests (except /health) must include
/// either `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected_key = match &state.api_key {
        Some(k) => k,
        None => return next.run(request).await,
    };

    // Load balancer probes.
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    if let Some(auth) = auth_header {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if token == expected_key {
                return next.run(request).await;
            }
            return forbidden();
        }
    }

    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if let Some(key) = api_key_header {
        if key == expected_key {
            return next.run(request).await;
        }
        return forbidden();
    }

    ApiError::new(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "authentication required",
    )
    .into_response()
}

fn forbidden() -> Response {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden", "invalid API key").into_response()
}

/// The operator named by the `X-Actor-Id` header.
///
/// Rejects the request with 401 when the header is missing or blank.
#[derive(Debug, Clone)]
pub(crate) struct HeaderIdentity {
    actor_id: String,
}

impl IdentityContext for HeaderIdentity {
    fn current_actor_id(&self) -> Option<String> {
        Some(self.actor_id.clone())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for HeaderIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| HeaderIdentity {
                actor_id: v.to_string(),
            })
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "unauthenticated",
                    "X-Actor-Id header is required",
                )
            })
    }
}
