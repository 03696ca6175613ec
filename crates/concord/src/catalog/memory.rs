//! In-memory catalog and config-entry store.
//!
//! Every write bumps a single monotonic index, so any read returns the
//! index of the snapshot it saw.

use async_trait::async_trait;
use concord_common::{
    CatalogRecord, ConcordError, ConfigEntry, ConfigEntryKind, Consistency, HealthCheck, Indexed,
    Node, ServiceInstance,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

use super::{CatalogReader, ConfigEntryReader};

/// A catalog registration: a node plus optionally one service and one check
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterRequest {
    pub node: Node,
    #[serde(default)]
    pub service: Option<ServiceInstance>,
    #[serde(default)]
    pub check: Option<HealthCheck>,
}

/// Initial catalog contents loaded at startup
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Seed {
    #[serde(default)]
    pub registrations: Vec<RegisterRequest>,
    #[serde(default)]
    pub config_entries: Vec<ConfigEntry>,
}

#[derive(Default)]
struct CatalogState {
    index: u64,
    nodes: BTreeMap<String, CatalogRecord>,
    entries: BTreeMap<(ConfigEntryKind, String), ConfigEntry>,
}

/// Single-datacenter in-memory store
pub struct MemoryCatalog {
    datacenter: String,
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new(datacenter: impl Into<String>) -> Self {
        Self {
            datacenter: datacenter.into(),
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Load registrations and config entries from a JSON seed file
    pub async fn load_seed(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let seed: Seed = serde_json::from_str(&data).context("Failed to parse seed file")?;

        let (registrations, entries) = (seed.registrations.len(), seed.config_entries.len());
        for req in seed.registrations {
            self.register(req).await?;
        }
        for entry in seed.config_entries {
            self.upsert_config_entry(entry).await;
        }

        tracing::info!(
            registrations = registrations,
            config_entries = entries,
            "📦 Catalog seeded"
        );
        Ok(())
    }

    /// Register or update a node, and optionally one service and one check
    pub async fn register(&self, req: RegisterRequest) -> Result<u64, ConcordError> {
        if req.node.name.is_empty() {
            return Err(ConcordError::validation("Must provide node"));
        }

        let mut state = self.state.write().await;

        let mut service = req.service;
        if let Some(svc) = service.as_mut() {
            if svc.id.is_empty() {
                svc.id = svc.service.clone();
            }
        }

        let mut check = req.check;
        if let Some(check) = check.as_mut() {
            check.node = req.node.name.clone();
            if check.check_id.is_empty() {
                check.check_id = check.name.clone();
            }
            if !check.service_id.is_empty() {
                // Checks must point at an instance on this node
                let owner = service
                    .as_ref()
                    .filter(|svc| svc.id == check.service_id)
                    .or_else(|| {
                        state
                            .nodes
                            .get(&req.node.name)
                            .and_then(|r| r.services.get(&check.service_id))
                    });
                let Some(owner) = owner else {
                    return Err(ConcordError::validation(format!(
                        "Unknown service {:?} for check {:?}",
                        check.service_id, check.check_id
                    )));
                };
                check.service_name = owner.service.clone();
            }
        }

        state.index += 1;
        let index = state.index;

        let mut node = req.node;
        if node.datacenter.is_empty() {
            node.datacenter = self.datacenter.clone();
        }
        let name = node.name.clone();

        let record = state.nodes.entry(name.clone()).or_insert_with(|| CatalogRecord {
            node: node.clone(),
            services: BTreeMap::new(),
            checks: Vec::new(),
            modify_index: index,
        });
        record.node = node;
        record.modify_index = index;

        if let Some(svc) = service {
            record.services.insert(svc.id.clone(), svc);
        }
        if let Some(check) = check {
            record.checks.retain(|c| c.check_id != check.check_id);
            record.checks.push(check);
        }

        tracing::debug!(node = %name, index = index, "Registered catalog entry");
        Ok(index)
    }

    pub async fn upsert_config_entry(&self, mut entry: ConfigEntry) -> u64 {
        let mut state = self.state.write().await;
        state.index += 1;
        let index = state.index;

        entry.set_modify_index(index);
        tracing::debug!(kind = %entry.kind(), name = entry.name(), "Config entry stored");
        state.entries.insert((entry.kind(), entry.name().to_string()), entry);
        index
    }

    fn check_datacenter(&self, dc: &str) -> Result<(), ConcordError> {
        if dc.is_empty() || dc == self.datacenter {
            Ok(())
        } else {
            Err(ConcordError::NotFound(format!("No path to datacenter {dc:?}")))
        }
    }
}

#[async_trait]
impl CatalogReader for MemoryCatalog {
    async fn get_node(&self, dc: &str, name: &str) -> Result<Indexed<Option<CatalogRecord>>, ConcordError> {
        self.check_datacenter(dc)?;
        let state = self.state.read().await;
        Ok(Indexed::new(state.index, state.nodes.get(name).cloned()))
    }

    async fn list_nodes(
        &self,
        dc: &str,
        _consistency: Consistency,
    ) -> Result<Indexed<Vec<CatalogRecord>>, ConcordError> {
        // A single local replica is always fresh, whatever the staleness bound
        self.check_datacenter(dc)?;
        let state = self.state.read().await;
        Ok(Indexed::new(state.index, state.nodes.values().cloned().collect()))
    }
}

#[async_trait]
impl ConfigEntryReader for MemoryCatalog {
    async fn get_config_entry(
        &self,
        dc: &str,
        kind: ConfigEntryKind,
        name: &str,
    ) -> Result<Option<ConfigEntry>, ConcordError> {
        self.check_datacenter(dc)?;
        let state = self.state.read().await;
        Ok(state.entries.get(&(kind, name.to_string())).cloned())
    }
}
