//! User event endpoint.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{ApiError, token};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FireQuery {
    dc: Option<String>,
}

/// The event as delivered; the payload is base64-encoded
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FiredEvent {
    #[serde(rename = "ID")]
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    datacenter: String,
    fired_at: i64,
}

/// PUT /v1/event/fire/{name}
pub async fn fire(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<FireQuery>,
    body: Bytes,
) -> Result<Json<FiredEvent>, ApiError> {
    let dc = query.dc.unwrap_or_default();
    let event = state
        .internal
        .event_fire(&dc, token(&headers).as_deref(), &name, body.to_vec())
        .await?;

    Ok(Json(FiredEvent {
        payload: (!event.payload.is_empty()).then(|| STANDARD.encode(&event.payload)),
        id: event.id,
        name: event.name,
        datacenter: event.datacenter,
        fired_at: event.fired_at,
    }))
}
