//! Read-only view of gossip membership pools.

use async_trait::async_trait;
use concord_common::{ConcordError, KeyringOp, MemberKeyReport};
use serde::Serialize;
use std::fmt;

/// A gossip membership pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolId {
    /// Datacenter-local pool
    Lan { datacenter: String },
    /// Pool spanning the servers of every datacenter
    Wan,
}

impl PoolId {
    pub fn lan(datacenter: impl Into<String>) -> Self {
        Self::Lan {
            datacenter: datacenter.into(),
        }
    }

    pub fn is_wan(&self) -> bool {
        matches!(self, Self::Wan)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lan { datacenter } => write!(f, "lan/{datacenter}"),
            Self::Wan => f.write_str("wan"),
        }
    }
}

/// Pools reachable for one datacenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSet {
    pub lan: PoolId,
    /// Only present where servers take part in WAN gossip
    pub wan: Option<PoolId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Alive,
    Failed,
    Left,
}

/// One member of a pool as seen by the failure detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Member {
    pub name: String,
    pub addr: String,
    pub datacenter: String,
    pub status: MemberStatus,
}

impl Member {
    pub fn is_alive(&self) -> bool {
        self.status == MemberStatus::Alive
    }
}

/// Operation sent to a single member's keyring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOperation {
    pub op: KeyringOp,
    /// Base64 key; required for everything but list
    pub key: Option<String>,
}

/// Gossip state, injected as a capability
#[async_trait]
pub trait GossipPools: Send + Sync {
    /// Pools serving a datacenter. Remote datacenters are reached
    /// through the WAN; failure means no path to that datacenter.
    async fn list_pools(&self, dc: &str) -> Result<PoolSet, ConcordError>;

    /// Datacenters known through the WAN pool, including the local one
    async fn wan_datacenters(&self) -> Result<Vec<String>, ConcordError>;

    async fn list_members(&self, pool: &PoolId) -> Result<Vec<Member>, ConcordError>;

    /// Run one keyring operation on one member of a pool
    async fn invoke_key_op(
        &self,
        pool: &PoolId,
        member: &Member,
        op: &KeyOperation,
    ) -> Result<MemberKeyReport, ConcordError>;
}
