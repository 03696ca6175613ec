//! Read interfaces onto the replicated catalog and config-entry stores.
//!
//! The stores themselves live elsewhere; this layer only reads snapshots.
//! `MemoryCatalog` backs both traits for standalone runs and tests.

mod memory;

pub use memory::{MemoryCatalog, RegisterRequest, Seed};

use async_trait::async_trait;
use concord_common::{
    CatalogRecord, ConcordError, ConfigEntry, ConfigEntryKind, Consistency, Indexed,
    ServiceDumpRecord, ServiceKind,
};

/// Point-in-time read access to catalog records
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// One node's record, if registered
    async fn get_node(&self, dc: &str, name: &str) -> Result<Indexed<Option<CatalogRecord>>, ConcordError>;

    /// Every node in the datacenter, read as one snapshot
    async fn list_nodes(
        &self,
        dc: &str,
        consistency: Consistency,
    ) -> Result<Indexed<Vec<CatalogRecord>>, ConcordError>;

    /// Whole-catalog snapshot backing derived views. Defaults to a node
    /// listing; stores that can serve a cheaper consistent read override it.
    async fn snapshot(&self, dc: &str, consistency: Consistency) -> Result<Indexed<Vec<CatalogRecord>>, ConcordError> {
        self.list_nodes(dc, consistency).await
    }

    /// Every service instance joined with its node and checks, optionally
    /// restricted to one kind. Stores with a kind index should override this.
    async fn list_service_instances(
        &self,
        dc: &str,
        consistency: Consistency,
        kind: Option<ServiceKind>,
    ) -> Result<Indexed<Vec<ServiceDumpRecord>>, ConcordError> {
        let snapshot = self.list_nodes(dc, consistency).await?;
        let rows = snapshot
            .value
            .iter()
            .flat_map(|record| service_rows(record, kind))
            .collect();
        Ok(Indexed::new(snapshot.index, rows))
    }
}

/// Read access to declarative config entries
#[async_trait]
pub trait ConfigEntryReader: Send + Sync {
    async fn get_config_entry(
        &self,
        dc: &str,
        kind: ConfigEntryKind,
        name: &str,
    ) -> Result<Option<ConfigEntry>, ConcordError>;
}

/// Split one node record into per-instance rows. Each row carries the
/// node-level checks plus the checks of that instance.
pub fn service_rows(record: &CatalogRecord, kind: Option<ServiceKind>) -> Vec<ServiceDumpRecord> {
    record
        .services
        .values()
        .filter(|svc| kind.is_none_or(|k| svc.kind == k))
        .map(|svc| ServiceDumpRecord {
            node: record.node.clone(),
            service: svc.clone(),
            checks: record
                .checks
                .iter()
                .filter(|c| c.is_node_level() || c.service_id == svc.id)
                .cloned()
                .collect(),
        })
        .collect()
}
