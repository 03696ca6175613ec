//! Snapshot view and gateway endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
};
use concord::QueryOptions;
use concord_common::{ConcordError, Consistency, ServiceKind};
use serde::Deserialize;

use super::{ApiError, flag, indexed, token};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// Target datacenter; local when absent
    dc: Option<String>,
    filter: Option<String>,
    /// Allow any server to answer
    stale: Option<String>,
    /// Require a quorum-checked leader read
    consistent: Option<String>,
    /// Service kind restriction (service dump only)
    kind: Option<String>,
}

impl ReadQuery {
    fn options(&self, headers: &HeaderMap) -> QueryOptions {
        let consistency = if flag(&self.stale) {
            Consistency::Stale { max_stale: None }
        } else if flag(&self.consistent) {
            Consistency::Consistent
        } else {
            Consistency::Default
        };

        QueryOptions {
            datacenter: self.dc.clone().unwrap_or_default(),
            token: token(headers),
            filter: self.filter.clone().unwrap_or_default(),
            consistency,
        }
    }

    fn kind(&self) -> Result<Option<ServiceKind>, ConcordError> {
        self.kind.as_deref().map(str::parse).transpose()
    }
}

/// GET /v1/internal/node/{node}
pub async fn node_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(node): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Response, ApiError> {
    let result = state.internal.node_info(&query.options(&headers), &node).await?;
    Ok(indexed(result))
}

/// GET /v1/internal/nodes
pub async fn node_dump(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReadQuery>,
) -> Result<Response, ApiError> {
    let result = state.internal.node_dump(&query.options(&headers)).await?;
    Ok(indexed(result))
}

/// GET /v1/internal/services
pub async fn service_dump(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReadQuery>,
) -> Result<Response, ApiError> {
    let kind = query.kind()?;
    let result = state.internal.service_dump(&query.options(&headers), kind).await?;
    Ok(indexed(result))
}

/// GET /v1/internal/gateway-services/{gateway}
pub async fn gateway_services(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(gateway): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Response, ApiError> {
    let result = state
        .internal
        .gateway_services(&query.options(&headers), &gateway)
        .await?;
    Ok(indexed(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_query_options() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Concord-Token", "secret".parse().unwrap());

        let query = ReadQuery {
            dc: Some("dc2".to_string()),
            stale: Some(String::new()),
            ..Default::default()
        };
        let opts = query.options(&headers);
        assert_eq!(opts.datacenter, "dc2");
        assert_eq!(opts.token(), Some("secret"));
        assert_eq!(opts.consistency, Consistency::Stale { max_stale: None });

        let consistent = ReadQuery {
            consistent: Some("true".to_string()),
            ..Default::default()
        };
        assert_eq!(consistent.options(&HeaderMap::new()).consistency, Consistency::Consistent);
    }

    #[test]
    fn test_kind_parsing() {
        let query = ReadQuery {
            kind: Some("mesh-gateway".to_string()),
            ..Default::default()
        };
        assert_eq!(query.kind().unwrap(), Some(ServiceKind::MeshGateway));
        assert_eq!(ReadQuery::default().kind().unwrap(), None);
    }
}
