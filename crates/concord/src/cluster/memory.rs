//! In-memory gossip pools.
//!
//! Datacenters hold LAN members; servers also join the shared WAN pool
//! under `<node>.<datacenter>`. Every member keeps its own keyring per
//! pool. Failures, latency and partitions can be injected per member or
//! per datacenter.

use async_trait::async_trait;
use concord_common::{ConcordError, KeyringOp, MemberKeyReport};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::pools::{GossipPools, KeyOperation, Member, MemberStatus, PoolId, PoolSet};

/// Keys held by one member in one pool
#[derive(Debug, Clone, Default)]
struct MemberKeyring {
    keys: Vec<String>,
    primary: Option<String>,
}

impl MemberKeyring {
    fn with_primary(key: Option<&str>) -> Self {
        match key {
            Some(key) => Self {
                keys: vec![key.to_string()],
                primary: Some(key.to_string()),
            },
            None => Self::default(),
        }
    }

    fn report(&self) -> MemberKeyReport {
        MemberKeyReport {
            keys: self.keys.clone(),
            primary_key: self.primary.clone(),
        }
    }

    fn apply(&mut self, op: &KeyOperation) -> Result<MemberKeyReport, ConcordError> {
        let key = match (op.op, op.key.as_deref()) {
            (KeyringOp::List, _) => return Ok(self.report()),
            (_, Some(key)) => key.to_string(),
            (_, None) => return Err(ConcordError::Internal(format!("{} without a key", op.op))),
        };

        match op.op {
            KeyringOp::Install => {
                if !self.keys.contains(&key) {
                    self.keys.push(key);
                }
            }
            KeyringOp::Use => {
                if !self.keys.contains(&key) {
                    return Err(ConcordError::Internal("Requested key is not in the keyring".to_string()));
                }
                self.primary = Some(key);
            }
            KeyringOp::Remove => {
                if self.primary.as_ref() == Some(&key) {
                    return Err(ConcordError::Internal("Removing the primary key is not allowed".to_string()));
                }
                self.keys.retain(|k| k != &key);
            }
            KeyringOp::List => {}
        }
        Ok(MemberKeyReport::default())
    }
}

#[derive(Default)]
struct PoolsState {
    lan: BTreeMap<String, Vec<Member>>,
    wan: Vec<Member>,
    keyrings: HashMap<(PoolId, String), MemberKeyring>,
    failures: HashMap<String, String>,
    latency: HashMap<String, Duration>,
    partitioned: HashSet<String>,
}

impl PoolsState {
    fn members_mut(&mut self, pool: &PoolId) -> Option<&mut Vec<Member>> {
        match pool {
            PoolId::Lan { datacenter } => self.lan.get_mut(datacenter),
            PoolId::Wan => Some(&mut self.wan),
        }
    }

    fn no_path(dc: &str) -> ConcordError {
        ConcordError::UnreachablePool {
            datacenter: dc.to_string(),
            reason: "No path to datacenter".to_string(),
        }
    }

    fn reachable(&self, dc: &str) -> Result<(), ConcordError> {
        if self.partitioned.contains(dc) || !self.lan.contains_key(dc) {
            return Err(Self::no_path(dc));
        }
        Ok(())
    }
}

/// Membership and keyrings for every datacenter, held in memory
pub struct MemoryPools {
    encrypt: Option<String>,
    state: RwLock<PoolsState>,
    contacts: AtomicUsize,
}

impl MemoryPools {
    /// `encrypt` becomes the primary key of every member that joins
    pub fn new(local_dc: impl Into<String>, encrypt: Option<String>) -> Self {
        let mut state = PoolsState::default();
        state.lan.insert(local_dc.into(), Vec::new());

        Self {
            encrypt,
            state: RwLock::new(state),
            contacts: AtomicUsize::new(0),
        }
    }

    /// Add a member to its datacenter's LAN pool; servers also join the WAN
    pub async fn join(&self, dc: &str, name: &str, addr: &str, server: bool) {
        let mut state = self.state.write().await;

        let add = |state: &mut PoolsState, pool: PoolId, member_name: String| {
            let member = Member {
                name: member_name.clone(),
                addr: addr.to_string(),
                datacenter: dc.to_string(),
                status: MemberStatus::Alive,
            };
            state
                .keyrings
                .entry((pool.clone(), member_name.clone()))
                .or_insert_with(|| MemberKeyring::with_primary(self.encrypt.as_deref()));

            let members = match &pool {
                PoolId::Lan { datacenter } => state.lan.entry(datacenter.clone()).or_default(),
                PoolId::Wan => &mut state.wan,
            };
            members.retain(|m| m.name != member_name);
            members.push(member);
        };

        add(&mut *state, PoolId::lan(dc), name.to_string());
        if server {
            add(&mut *state, PoolId::Wan, format!("{name}.{dc}"));
        }

        tracing::info!(datacenter = %dc, member = %name, server = server, "Member joined");
    }

    /// Update a member's status in its LAN pool and, for servers, the WAN
    pub async fn set_status(&self, dc: &str, name: &str, status: MemberStatus) {
        let mut state = self.state.write().await;
        let wan_name = format!("{name}.{dc}");

        for (pool, member_name) in [(PoolId::lan(dc), name), (PoolId::Wan, wan_name.as_str())] {
            if let Some(members) = state.members_mut(&pool) {
                for member in members.iter_mut().filter(|m| m.name == member_name) {
                    member.status = status;
                }
            }
        }
    }

    /// Make every keyring call on the named member fail
    pub async fn fail_member(&self, member: &str, message: &str) {
        self.state
            .write()
            .await
            .failures
            .insert(member.to_string(), message.to_string());
    }

    /// Delay every keyring call on the named member
    pub async fn delay_member(&self, member: &str, latency: Duration) {
        self.state.write().await.latency.insert(member.to_string(), latency);
    }

    /// Cut off a datacenter: its pools can no longer be listed
    pub async fn partition(&self, dc: &str) {
        self.state.write().await.partitioned.insert(dc.to_string());
        tracing::warn!(datacenter = %dc, "Datacenter partitioned");
    }

    /// Number of calls made into the pools so far
    pub fn contacts(&self) -> usize {
        self.contacts.load(Ordering::Relaxed)
    }

    /// Current keyring of one member, if it belongs to the pool
    pub async fn member_keys(&self, pool: &PoolId, member: &str) -> Option<MemberKeyReport> {
        let state = self.state.read().await;
        state
            .keyrings
            .get(&(pool.clone(), member.to_string()))
            .map(MemberKeyring::report)
    }

    fn touch(&self) {
        self.contacts.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl GossipPools for MemoryPools {
    async fn list_pools(&self, dc: &str) -> Result<PoolSet, ConcordError> {
        self.touch();
        let state = self.state.read().await;
        state.reachable(dc)?;

        let has_servers = state.wan.iter().any(|m| m.datacenter == dc);
        Ok(PoolSet {
            lan: PoolId::lan(dc),
            wan: has_servers.then_some(PoolId::Wan),
        })
    }

    async fn wan_datacenters(&self) -> Result<Vec<String>, ConcordError> {
        self.touch();
        let state = self.state.read().await;
        let dcs: BTreeSet<&String> = state.wan.iter().map(|m| &m.datacenter).collect();
        Ok(dcs.into_iter().cloned().collect())
    }

    async fn list_members(&self, pool: &PoolId) -> Result<Vec<Member>, ConcordError> {
        self.touch();
        let state = self.state.read().await;
        match pool {
            PoolId::Lan { datacenter } => {
                state.reachable(datacenter)?;
                Ok(state.lan.get(datacenter).cloned().unwrap_or_default())
            }
            PoolId::Wan => Ok(state.wan.clone()),
        }
    }

    async fn invoke_key_op(
        &self,
        pool: &PoolId,
        member: &Member,
        op: &KeyOperation,
    ) -> Result<MemberKeyReport, ConcordError> {
        self.touch();

        let (latency, failure) = {
            let state = self.state.read().await;
            (
                state.latency.get(&member.name).copied(),
                state.failures.get(&member.name).cloned(),
            )
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = failure {
            return Err(ConcordError::Internal(message));
        }

        let mut state = self.state.write().await;
        let keyring = state
            .keyrings
            .get_mut(&(pool.clone(), member.name.clone()))
            .ok_or_else(|| ConcordError::Internal(format!("{} is not a member of {pool}", member.name)))?;
        keyring.apply(op)
    }
}
