//! HTTP route handlers for Concord.

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use concord_common::constants::headers;
use concord_common::{ConcordError, Indexed};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod event;
mod health;
mod internal;
mod operator;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))

        // Versioned API
        .nest("/v1", api_routes())

        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))

        // Add shared state
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Snapshot views and gateway linkage
        .route("/internal/node/{node}", get(internal::node_info))
        .route("/internal/nodes", get(internal::node_dump))
        .route("/internal/services", get(internal::service_dump))
        .route("/internal/gateway-services/{gateway}", get(internal::gateway_services))

        // Keyring fan-out
        .route(
            "/operator/keyring",
            get(operator::list)
                .post(operator::install)
                .put(operator::use_key)
                .delete(operator::remove),
        )

        // User events
        .route("/event/fire/{name}", put(event::fire))
}

/// ACL token sent with the request, if any
fn token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(headers::X_CONCORD_TOKEN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Query flags count when present, unless explicitly false
fn flag(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| v != "false")
}

/// JSON body plus the index of the snapshot it came from
fn indexed<T: Serialize>(result: Indexed<T>) -> Response {
    (
        [(headers::X_CONCORD_INDEX, result.index.to_string())],
        Json(result.value),
    )
        .into_response()
}

/// Error response wrapper for [`ConcordError`]
#[derive(Debug)]
pub struct ApiError(ConcordError);

impl From<ConcordError> for ApiError {
    fn from(err: ConcordError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error = match &self.0 {
            ConcordError::Validation(_) => "validation",
            ConcordError::FilterCompile { .. } => "filter_compile",
            ConcordError::NotFound(_) => "not_found",
            ConcordError::PermissionDenied(_) => "permission_denied",
            ConcordError::UnreachablePool { .. } => "unreachable_pool",
            ConcordError::DeadlineExceeded(_) => "deadline_exceeded",
            ConcordError::Internal(_) => "internal_error",
        };

        if status.is_server_error() {
            tracing::warn!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        (
            status,
            Json(ErrorBody {
                error,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
