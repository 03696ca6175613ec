//! Catalog records and the composite views built from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ConcordError;

/// Registered kind of a service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Plain service, no proxy role
    #[default]
    Typical,
    ConnectProxy,
    MeshGateway,
    TerminatingGateway,
    IngressGateway,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        Self::Typical,
        Self::ConnectProxy,
        Self::MeshGateway,
        Self::TerminatingGateway,
        Self::IngressGateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typical => "typical",
            Self::ConnectProxy => "connect-proxy",
            Self::MeshGateway => "mesh-gateway",
            Self::TerminatingGateway => "terminating-gateway",
            Self::IngressGateway => "ingress-gateway",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = ConcordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The empty kind is how typical services are registered
        if s.is_empty() {
            return Ok(Self::Typical);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConcordError::validation(format!("unknown service kind {s:?}")))
    }
}

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passing => "passing",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// A catalog node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Node")]
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// A service instance registered on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceInstance {
    /// Unique within the owning node
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub kind: ServiceKind,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

/// A health check on a node or one of its services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    pub node: String,
    #[serde(rename = "CheckID")]
    pub check_id: String,
    pub name: String,
    pub status: HealthStatus,
    /// Empty for node-level checks
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub output: String,
}

impl HealthCheck {
    pub fn is_node_level(&self) -> bool {
        self.service_id.is_empty()
    }
}

/// Everything the catalog stores for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogRecord {
    pub node: Node,
    /// Keyed by service instance ID
    #[serde(default)]
    pub services: BTreeMap<String, ServiceInstance>,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
    #[serde(default)]
    pub modify_index: u64,
}

/// Composite of a node with all its services and checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeDumpRecord {
    #[serde(rename = "ID")]
    pub id: String,
    pub node: String,
    pub address: String,
    pub datacenter: String,
    pub meta: BTreeMap<String, String>,
    pub services: Vec<ServiceInstance>,
    pub checks: Vec<HealthCheck>,
}

/// Composite of one service instance with its node and relevant checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDumpRecord {
    pub node: Node,
    pub service: ServiceInstance,
    /// Node-level checks plus the checks of this instance
    pub checks: Vec<HealthCheck>,
}

/// Read consistency requested from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Leader read
    #[default]
    Default,
    /// Leader read with a quorum check
    Consistent,
    /// Any server may answer, within the given staleness bound
    Stale { max_stale: Option<Duration> },
}

/// A result set tagged with the catalog index it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Indexed<T> {
    pub index: u64,
    pub value: T,
}

impl<T> Indexed<T> {
    pub fn new(index: u64, value: T) -> Self {
        Self { index, value }
    }
}

/// User event delivered through the gossip layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserEvent {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub payload: Vec<u8>,
    pub datacenter: String,
    /// Unix timestamp
    pub fired_at: i64,
}
