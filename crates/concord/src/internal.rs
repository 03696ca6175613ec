//! The internal endpoint: one facade over the view builder, the gateway
//! resolver, the keyring coordinator and event delivery.

use concord_common::constants::USER_EVENT_SIZE_LIMIT;
use concord_common::{
    ConcordError, GatewayServiceLink, Indexed, KeyringResponses, NodeDumpRecord, ServiceDumpRecord,
    ServiceKind, UserEvent,
};
use rand::Rng;
use std::sync::Arc;

use crate::acl::{Authorizer, Redactor};
use crate::catalog::{CatalogReader, ConfigEntryReader};
use crate::cluster::{EventSink, GossipPools, KeyringCoordinator, KeyringRequest, KeyringSettings};
use crate::gateway::GatewayResolver;
use crate::views::{QueryOptions, ViewBuilder};

/// Everything the endpoint reads from or delivers to
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogReader>,
    pub entries: Arc<dyn ConfigEntryReader>,
    pub authorizer: Arc<dyn Authorizer>,
    pub pools: Arc<dyn GossipPools>,
    pub events: Arc<dyn EventSink>,
}

#[derive(Clone)]
pub struct Internal {
    datacenter: String,
    redactor: Redactor,
    views: ViewBuilder,
    gateways: GatewayResolver,
    keyring: Arc<KeyringCoordinator>,
    events: Arc<dyn EventSink>,
}

impl Internal {
    pub fn new(datacenter: impl Into<String>, deps: Collaborators, keyring: KeyringSettings) -> Self {
        let datacenter = datacenter.into();
        let redactor = Redactor::new(deps.authorizer);

        Self {
            views: ViewBuilder::new(deps.catalog.clone(), redactor.clone()),
            gateways: GatewayResolver::new(deps.catalog, deps.entries, redactor.clone()),
            keyring: Arc::new(KeyringCoordinator::new(
                datacenter.clone(),
                deps.pools,
                redactor.clone(),
                keyring,
            )),
            events: deps.events,
            redactor,
            datacenter,
        }
    }

    pub fn datacenter(&self) -> &str {
        &self.datacenter
    }

    fn resolve_dc<'a>(&'a self, dc: &'a str) -> &'a str {
        if dc.is_empty() { &self.datacenter } else { dc }
    }

    fn local(&self, opts: &QueryOptions) -> QueryOptions {
        QueryOptions {
            datacenter: self.resolve_dc(&opts.datacenter).to_string(),
            ..opts.clone()
        }
    }

    pub async fn node_info(&self, opts: &QueryOptions, node: &str) -> Result<Indexed<Vec<NodeDumpRecord>>, ConcordError> {
        if node.is_empty() {
            return Err(ConcordError::validation("Must provide node"));
        }
        self.views.node_info(&self.local(opts), node).await
    }

    pub async fn node_dump(&self, opts: &QueryOptions) -> Result<Indexed<Vec<NodeDumpRecord>>, ConcordError> {
        self.views.node_dump(&self.local(opts)).await
    }

    pub async fn service_dump(
        &self,
        opts: &QueryOptions,
        kind: Option<ServiceKind>,
    ) -> Result<Indexed<Vec<ServiceDumpRecord>>, ConcordError> {
        self.views.service_dump(&self.local(opts), kind).await
    }

    pub async fn gateway_services(
        &self,
        opts: &QueryOptions,
        gateway: &str,
    ) -> Result<Indexed<Vec<GatewayServiceLink>>, ConcordError> {
        self.gateways
            .gateway_services(self.resolve_dc(&opts.datacenter), gateway, opts.token())
            .await
    }

    pub async fn keyring_operation(&self, req: &KeyringRequest) -> Result<KeyringResponses, ConcordError> {
        let result = self.keyring.execute(req).await?;
        tracing::info!(
            operation = %req.operation,
            pools = result.responses.len(),
            errors = result.errors.len(),
            "🔑 Keyring operation finished"
        );
        Ok(result)
    }

    /// Fire a user event. Returns the event as delivered.
    pub async fn event_fire(
        &self,
        dc: &str,
        token: Option<&str>,
        name: &str,
        payload: Vec<u8>,
    ) -> Result<UserEvent, ConcordError> {
        if name.is_empty() {
            return Err(ConcordError::validation("User event name cannot be empty"));
        }
        let size = name.len() + payload.len();
        if size > USER_EVENT_SIZE_LIMIT {
            return Err(ConcordError::validation(format!(
                "User event exceeds size limit: {size} bytes, limit is {USER_EVENT_SIZE_LIMIT} bytes"
            )));
        }
        if !self.redactor.authorize_event_fire(token, name) {
            return Err(ConcordError::permission_denied(format!("event write access to {name:?} required")));
        }

        let dc = self.resolve_dc(dc);
        let event = UserEvent {
            id: format!("{:032x}", rand::rng().random::<u128>()),
            name: name.to_string(),
            payload,
            datacenter: dc.to_string(),
            fired_at: chrono::Utc::now().timestamp(),
        };

        self.events.fire(dc, event.clone()).await?;
        tracing::info!(event = %event.name, id = %event.id, datacenter = %dc, "📣 User event fired");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AclConfig, DefaultPolicy, RuleAuthorizer};
    use crate::catalog::{MemoryCatalog, RegisterRequest};
    use crate::cluster::{BroadcastEventSink, MemoryPools};
    use concord_common::{KeyringOp, Node};

    const KEY: &str = "H1dfkSZOVnP/JUnaBfTzXg==";

    struct Fixture {
        internal: Internal,
        catalog: Arc<MemoryCatalog>,
        events: Arc<BroadcastEventSink>,
    }

    async fn fixture(acl: AclConfig) -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new("dc1"));
        let pools = Arc::new(MemoryPools::new("dc1", Some(KEY.to_string())));
        pools.join("dc1", "server1", "10.0.0.1:8301", true).await;
        let events = Arc::new(BroadcastEventSink::new(16));

        let internal = Internal::new(
            "dc1",
            Collaborators {
                catalog: catalog.clone(),
                entries: catalog.clone(),
                authorizer: Arc::new(RuleAuthorizer::new(&acl)),
                pools,
                events: events.clone(),
            },
            KeyringSettings::default(),
        );

        Fixture {
            internal,
            catalog,
            events,
        }
    }

    fn deny_all() -> AclConfig {
        AclConfig {
            enabled: true,
            default_policy: DefaultPolicy::Deny,
            master_token: Some("root".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_event_fire_acl() {
        let fx = fixture(deny_all()).await;
        let mut rx = fx.events.subscribe();

        let err = fx
            .internal
            .event_fire("dc1", None, "foo", b"hello".to_vec())
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());

        let event = fx
            .internal
            .event_fire("", Some("root"), "foo", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(event.datacenter, "dc1");
        assert_eq!(event.id.len(), 32);

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered, event);
    }

    #[tokio::test]
    async fn test_event_validation() {
        let fx = fixture(AclConfig::default()).await;

        let empty = fx.internal.event_fire("dc1", None, "", Vec::new()).await;
        assert!(empty.unwrap_err().is_validation());

        let oversized = vec![0u8; USER_EVENT_SIZE_LIMIT];
        let err = fx.internal.event_fire("dc1", None, "big", oversized).await.unwrap_err();
        assert!(err.to_string().contains("size limit"));

        let fits = vec![0u8; USER_EVENT_SIZE_LIMIT - 3];
        assert!(fx.internal.event_fire("dc1", None, "big", fits).await.is_ok());
    }

    #[tokio::test]
    async fn test_event_ids_are_unique() {
        let fx = fixture(AclConfig::default()).await;
        let a = fx.internal.event_fire("dc1", None, "a", Vec::new()).await.unwrap();
        let b = fx.internal.event_fire("dc1", None, "a", Vec::new()).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_node_dump_defaults_to_local_datacenter() {
        let fx = fixture(AclConfig::default()).await;
        fx.catalog
            .register(RegisterRequest {
                node: Node {
                    name: "foo".to_string(),
                    address: "127.0.0.1".to_string(),
                    ..Default::default()
                },
                service: None,
                check: None,
            })
            .await
            .unwrap();

        let dump = fx.internal.node_dump(&QueryOptions::default()).await.unwrap();
        assert_eq!(dump.value.len(), 1);
        assert_eq!(dump.value[0].datacenter, "dc1");

        let missing = fx.internal.node_info(&QueryOptions::default(), "").await;
        assert!(missing.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_keyring_through_facade() {
        let fx = fixture(AclConfig::default()).await;

        let result = fx
            .internal
            .keyring_operation(&KeyringRequest::new(KeyringOp::List))
            .await
            .unwrap();
        assert_eq!(result.responses.len(), 2);

        let err = fx
            .internal
            .keyring_operation(&KeyringRequest::new(KeyringOp::Remove).with_key(KEY).local_only())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("LocalOnly"));
    }
}
