//! Health check endpoint.

use axum::{Json, extract::State};
use concord::cluster::{GossipPools, PoolId};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    datacenter: String,
    node: String,
    /// Live members of the local LAN pool
    members: usize,
}

/// Basic health check (is the server running?)
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let datacenter = state.internal.datacenter().to_string();
    let members = state
        .pools
        .list_members(&PoolId::lan(datacenter.as_str()))
        .await
        .map(|members| members.iter().filter(|m| m.is_alive()).count())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        datacenter,
        node: state.config.node_name.clone(),
        members,
    })
}
