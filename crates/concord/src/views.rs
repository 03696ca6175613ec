//! Snapshot views: node and service dumps.
//!
//! Each request makes one catalog read, joins nodes with their services and
//! checks in memory, redacts, then applies the request filter. Filters only
//! ever see what the caller is allowed to read.

use concord_common::{
    CatalogRecord, ConcordError, Consistency, Indexed, NodeDumpRecord, ServiceDumpRecord,
    ServiceKind,
};
use std::sync::Arc;

use crate::acl::Redactor;
use crate::catalog::CatalogReader;
use crate::filter::Filter;

/// Options shared by every read request
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Empty means the local datacenter
    pub datacenter: String,
    pub token: Option<String>,
    pub filter: String,
    pub consistency: Consistency,
}

impl QueryOptions {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Join a catalog record into its composite form
pub fn node_composite(record: &CatalogRecord) -> NodeDumpRecord {
    NodeDumpRecord {
        id: record.node.id.clone(),
        node: record.node.name.clone(),
        address: record.node.address.clone(),
        datacenter: record.node.datacenter.clone(),
        meta: record.node.meta.clone(),
        services: record.services.values().cloned().collect(),
        checks: record.checks.clone(),
    }
}

/// Builds filtered, redacted views over catalog snapshots
#[derive(Clone)]
pub struct ViewBuilder {
    catalog: Arc<dyn CatalogReader>,
    redactor: Redactor,
}

impl ViewBuilder {
    pub fn new(catalog: Arc<dyn CatalogReader>, redactor: Redactor) -> Self {
        Self { catalog, redactor }
    }

    /// Composite record for one node. A missing node is an empty result.
    pub async fn node_info(
        &self,
        opts: &QueryOptions,
        node: &str,
    ) -> Result<Indexed<Vec<NodeDumpRecord>>, ConcordError> {
        let filter = Filter::compile(&opts.filter)?;
        let snapshot = self.catalog.get_node(&opts.datacenter, node).await?;

        let records: Vec<NodeDumpRecord> = snapshot.value.iter().map(node_composite).collect();
        let records = filter.apply(self.redactor.filter_nodes(opts.token(), records));

        tracing::debug!(node = %node, found = !records.is_empty(), "Node info");
        Ok(Indexed::new(snapshot.index, records))
    }

    /// Composite records for every node in the datacenter
    pub async fn node_dump(&self, opts: &QueryOptions) -> Result<Indexed<Vec<NodeDumpRecord>>, ConcordError> {
        let filter = Filter::compile(&opts.filter)?;
        let snapshot = self.catalog.list_nodes(&opts.datacenter, opts.consistency).await?;

        let total = snapshot.value.len();
        let records: Vec<NodeDumpRecord> = snapshot.value.iter().map(node_composite).collect();
        let records = filter.apply(self.redactor.filter_nodes(opts.token(), records));

        tracing::debug!(
            datacenter = %opts.datacenter,
            total = total,
            returned = records.len(),
            "Node dump"
        );
        Ok(Indexed::new(snapshot.index, records))
    }

    /// One row per service instance, optionally restricted to a kind.
    /// The kind restriction runs before the filter expression.
    pub async fn service_dump(
        &self,
        opts: &QueryOptions,
        kind: Option<ServiceKind>,
    ) -> Result<Indexed<Vec<ServiceDumpRecord>>, ConcordError> {
        let filter = Filter::compile(&opts.filter)?;
        let rows = self
            .catalog
            .list_service_instances(&opts.datacenter, opts.consistency, kind)
            .await?;

        let total = rows.value.len();
        let records = filter.apply(self.redactor.filter_service_dump(opts.token(), rows.value));

        tracing::debug!(
            datacenter = %opts.datacenter,
            kind = ?kind,
            total = total,
            returned = records.len(),
            "Service dump"
        );
        Ok(Indexed::new(rows.index, records))
    }
}
