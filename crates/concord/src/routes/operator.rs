//! Keyring operator endpoints.
//!
//! - GET    list installed keys
//! - POST   install a key
//! - PUT    make an installed key primary
//! - DELETE remove a non-primary key

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use concord::cluster::KeyringRequest;
use concord_common::{KeyringOp, KeyringPoolResponse};
use serde::{Deserialize, Serialize};

use super::{ApiError, flag, token};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct KeyringQuery {
    #[serde(rename = "local-only")]
    local_only: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyBody {
    key: String,
}

/// Pool responses plus the pools that could not be consulted
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyringReply {
    responses: Vec<KeyringPoolResponse>,
    errors: Vec<String>,
}

async fn run(
    state: &AppState,
    headers: &HeaderMap,
    query: &KeyringQuery,
    op: KeyringOp,
    key: Option<String>,
) -> Result<Json<KeyringReply>, ApiError> {
    let mut req = KeyringRequest::new(op);
    req.key = key;
    req.local_only = flag(&query.local_only);
    req.token = token(headers);

    let result = state.internal.keyring_operation(&req).await?;

    Ok(Json(KeyringReply {
        responses: result.responses,
        errors: result.errors.iter().map(ToString::to_string).collect(),
    }))
}

/// GET /v1/operator/keyring
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyringQuery>,
) -> Result<Json<KeyringReply>, ApiError> {
    run(&state, &headers, &query, KeyringOp::List, None).await
}

/// POST /v1/operator/keyring
pub async fn install(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyringQuery>,
    Json(body): Json<KeyBody>,
) -> Result<Json<KeyringReply>, ApiError> {
    run(&state, &headers, &query, KeyringOp::Install, Some(body.key)).await
}

/// PUT /v1/operator/keyring
pub async fn use_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyringQuery>,
    Json(body): Json<KeyBody>,
) -> Result<Json<KeyringReply>, ApiError> {
    run(&state, &headers, &query, KeyringOp::Use, Some(body.key)).await
}

/// DELETE /v1/operator/keyring
pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyringQuery>,
    Json(body): Json<KeyBody>,
) -> Result<Json<KeyringReply>, ApiError> {
    run(&state, &headers, &query, KeyringOp::Remove, Some(body.key)).await
}
