//! Application state and shared resources.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use concord::acl::RuleAuthorizer;
use concord::catalog::{MemoryCatalog, RegisterRequest};
use concord::cluster::{BroadcastEventSink, MemoryPools};
use concord::internal::{Collaborators, Internal};

use concord_common::constants::CLUSTER_SERVICE_NAME;
use concord_common::{HealthCheck, HealthStatus, Node, ServiceInstance};

use crate::config::AppConfig;

/// Buffered user events per subscriber
const EVENT_BUFFER: usize = 256;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Query and coordination endpoint
    pub internal: Internal,

    /// Gossip membership
    pub pools: Arc<MemoryPools>,

    /// User event delivery
    pub events: Arc<BroadcastEventSink>,
}

impl AppState {
    /// Build state over in-memory collaborators, seeding the catalog and
    /// joining this node to its pools
    pub async fn new(config: AppConfig) -> Result<Self> {
        let catalog = Arc::new(MemoryCatalog::new(config.datacenter.clone()));
        if let Some(seed) = &config.seed_path {
            catalog
                .load_seed(Path::new(seed))
                .await
                .context("Failed to seed catalog")?;
        }

        register_self(&catalog, &config).await?;

        let pools = Arc::new(MemoryPools::new(config.datacenter.clone(), config.encrypt.clone()));
        pools
            .join(&config.datacenter, &config.node_name, &config.listen_addr, true)
            .await;

        let events = Arc::new(BroadcastEventSink::new(EVENT_BUFFER));
        let authorizer = Arc::new(RuleAuthorizer::new(&config.acl));

        let internal = Internal::new(
            config.datacenter.clone(),
            Collaborators {
                catalog: catalog.clone(),
                entries: catalog.clone(),
                authorizer,
                pools: pools.clone(),
                events: events.clone(),
            },
            config.keyring.settings(),
        );

        Ok(Self {
            config,
            internal,
            pools,
            events,
        })
    }
}

/// Register this node and the cluster service it runs, with a node-level
/// gossip health check
async fn register_self(catalog: &MemoryCatalog, config: &AppConfig) -> Result<()> {
    let (address, port) = match config.listen_addr.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or_default()),
        None => (config.listen_addr.clone(), 0),
    };

    catalog
        .register(RegisterRequest {
            node: Node {
                name: config.node_name.clone(),
                address: address.clone(),
                datacenter: config.datacenter.clone(),
                ..Default::default()
            },
            service: Some(ServiceInstance {
                id: CLUSTER_SERVICE_NAME.to_string(),
                service: CLUSTER_SERVICE_NAME.to_string(),
                address,
                port,
                ..Default::default()
            }),
            check: Some(HealthCheck {
                node: config.node_name.clone(),
                check_id: "serfHealth".to_string(),
                name: "Serf Health Status".to_string(),
                status: HealthStatus::Passing,
                service_id: String::new(),
                service_name: String::new(),
                output: "Agent alive and reachable".to_string(),
            }),
        })
        .await
        .context("Failed to register local node")?;

    Ok(())
}
