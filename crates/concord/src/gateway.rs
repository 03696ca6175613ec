//! Gateway linkage resolution.
//!
//! Turns a gateway's config entry plus one catalog snapshot into the set
//! of services the gateway fronts. Explicit entries keep their config
//! order and TLS settings; a terminating gateway's `*` entry then adds
//! every other registered service, sorted by name.

use concord_common::constants::{CLUSTER_SERVICE_NAME, WILDCARD_SERVICE};
use concord_common::{
    CatalogRecord, ConcordError, ConfigEntry, ConfigEntryKind, Consistency, GatewayServiceLink,
    IngressListener, Indexed, LinkedService, ServiceKind,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::acl::Redactor;
use crate::catalog::{CatalogReader, ConfigEntryReader};

/// Resolves gateway config entries into service links
#[derive(Clone)]
pub struct GatewayResolver {
    catalog: Arc<dyn CatalogReader>,
    entries: Arc<dyn ConfigEntryReader>,
    redactor: Redactor,
}

impl GatewayResolver {
    pub fn new(catalog: Arc<dyn CatalogReader>, entries: Arc<dyn ConfigEntryReader>, redactor: Redactor) -> Self {
        Self {
            catalog,
            entries,
            redactor,
        }
    }

    /// Links for one gateway, redacted for the caller
    pub async fn gateway_services(
        &self,
        dc: &str,
        gateway: &str,
        token: Option<&str>,
    ) -> Result<Indexed<Vec<GatewayServiceLink>>, ConcordError> {
        if gateway.is_empty() {
            return Err(ConcordError::validation("Must provide a gateway name"));
        }
        self.redactor.authorize_gateway(token, gateway)?;

        let entry = self.gateway_entry(dc, gateway).await?;
        let snapshot = self.catalog.snapshot(dc, Consistency::Default).await?;

        let mut links = match &entry {
            ConfigEntry::TerminatingGateway { services, .. } => {
                terminating_links(gateway, services, &registered_services(&snapshot.value))
            }
            ConfigEntry::IngressGateway { listeners, .. } => ingress_links(gateway, listeners)?,
        };

        for link in &mut links {
            link.create_index = entry.modify_index();
            link.modify_index = entry.modify_index();
        }

        let total = links.len();
        let links = self.redactor.filter_service_links(token, gateway, links)?;

        tracing::debug!(
            gateway = %gateway,
            kind = %entry.kind(),
            total = total,
            returned = links.len(),
            "Resolved gateway services"
        );

        let index = snapshot.index.max(entry.modify_index());
        Ok(Indexed::new(index, links))
    }

    /// Terminating entry first, then ingress
    async fn gateway_entry(&self, dc: &str, gateway: &str) -> Result<ConfigEntry, ConcordError> {
        for kind in [ConfigEntryKind::TerminatingGateway, ConfigEntryKind::IngressGateway] {
            if let Some(entry) = self.entries.get_config_entry(dc, kind, gateway).await? {
                return Ok(entry);
            }
        }
        Err(ConcordError::NotFound(format!(
            "service {gateway:?} is not a configured terminating-gateway or ingress-gateway"
        )))
    }
}

/// Typical service names a wildcard may expand to, sorted
fn registered_services(records: &[CatalogRecord]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.services.values())
        .filter(|svc| svc.kind == ServiceKind::Typical && svc.service != CLUSTER_SERVICE_NAME)
        .map(|svc| svc.service.clone())
        .collect()
}

fn terminating_links(
    gateway: &str,
    services: &[LinkedService],
    registered: &BTreeSet<String>,
) -> Vec<GatewayServiceLink> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();
    let mut wildcard = None;

    for svc in services {
        if svc.is_wildcard() {
            wildcard.get_or_insert(svc);
        } else if svc.name.is_empty() {
            tracing::warn!(gateway = %gateway, "Skipping unnamed service in terminating-gateway entry");
        } else if seen.insert(svc.name.as_str()) {
            links.push(GatewayServiceLink::terminating(gateway, &svc.name, svc, false));
        }
    }

    if let Some(wildcard) = wildcard {
        for name in registered {
            if seen.insert(name.as_str()) {
                links.push(GatewayServiceLink::terminating(gateway, name, wildcard, true));
            }
        }
    }
    links
}

/// One link per service; the first listener naming a service wins
fn ingress_links(gateway: &str, listeners: &[IngressListener]) -> Result<Vec<GatewayServiceLink>, ConcordError> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    for listener in listeners {
        for svc in &listener.services {
            if svc.name == WILDCARD_SERVICE {
                return Err(ConcordError::validation(format!(
                    "Wildcard service is not supported on ingress gateway {gateway:?}"
                )));
            }
            if seen.insert(svc.name.as_str()) {
                links.push(GatewayServiceLink::ingress(gateway, &svc.name, listener));
            }
        }
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AclConfig, DefaultPolicy, PolicyLevel, Rule, RuleAuthorizer, RuleResource, TokenConfig};
    use crate::catalog::{MemoryCatalog, RegisterRequest};
    use concord_common::{GatewayKind, IngressService, Node, ServiceInstance};

    fn tls(name: &str, prefix: &str, sni: &str) -> LinkedService {
        LinkedService {
            name: name.to_string(),
            ca_file: Some(format!("{prefix}ca.crt")),
            cert_file: Some(format!("{prefix}client.crt")),
            key_file: Some(format!("{prefix}client.key")),
            sni: Some(sni.to_string()),
        }
    }

    async fn register(catalog: &MemoryCatalog, node: &str, service: &str, kind: ServiceKind) {
        catalog
            .register(RegisterRequest {
                node: Node {
                    name: node.to_string(),
                    address: "127.0.0.1".to_string(),
                    ..Default::default()
                },
                service: Some(ServiceInstance {
                    service: service.to_string(),
                    kind,
                    port: 443,
                    ..Default::default()
                }),
                check: None,
            })
            .await
            .unwrap();
    }

    async fn mesh() -> Arc<MemoryCatalog> {
        let catalog = Arc::new(MemoryCatalog::new("dc1"));
        register(&catalog, "foo", "gateway", ServiceKind::TerminatingGateway).await;
        register(&catalog, "foo", "api", ServiceKind::Typical).await;
        register(&catalog, "foo", "db", ServiceKind::Typical).await;
        register(&catalog, "foo", "redis", ServiceKind::Typical).await;
        register(&catalog, "foo", "redis-proxy", ServiceKind::ConnectProxy).await;
        register(&catalog, "server", "consul", ServiceKind::Typical).await;

        catalog
            .upsert_config_entry(ConfigEntry::TerminatingGateway {
                name: "gateway".to_string(),
                services: vec![
                    tls("api", "api/", "my-domain"),
                    LinkedService::named("db"),
                    tls("*", "", "my-alt-domain"),
                ],
                modify_index: 0,
            })
            .await;
        catalog
            .upsert_config_entry(ConfigEntry::IngressGateway {
                name: "ingress".to_string(),
                listeners: vec![
                    IngressListener {
                        port: 8888,
                        protocol: "tcp".to_string(),
                        services: vec![IngressService { name: "db".to_string() }],
                    },
                    IngressListener {
                        port: 9999,
                        protocol: "http".to_string(),
                        services: vec![
                            IngressService { name: "db".to_string() },
                            IngressService { name: "api".to_string() },
                        ],
                    },
                ],
                modify_index: 0,
            })
            .await;
        catalog
    }

    fn resolver(catalog: Arc<MemoryCatalog>, redactor: Redactor) -> GatewayResolver {
        GatewayResolver::new(catalog.clone(), catalog, redactor)
    }

    fn open() -> Redactor {
        Redactor::new(Arc::new(RuleAuthorizer::disabled()))
    }

    #[tokio::test]
    async fn test_terminating_gateway_services() {
        let gateways = resolver(mesh().await, open());

        let links = gateways.gateway_services("dc1", "gateway", None).await.unwrap().value;
        let names: Vec<_> = links.iter().map(|l| l.service.as_str()).collect();
        assert_eq!(names, vec!["api", "db", "redis"]);

        let api = &links[0];
        assert!(!api.from_wildcard);
        assert_eq!(api.gateway_kind, GatewayKind::TerminatingGateway);
        assert_eq!(api.ca_file.as_deref(), Some("api/ca.crt"));
        assert_eq!(api.sni.as_deref(), Some("my-domain"));
        assert!(api.create_index > 0);

        let db = &links[1];
        assert!(!db.from_wildcard);
        assert!(db.ca_file.is_none() && db.sni.is_none());

        let redis = &links[2];
        assert!(redis.from_wildcard);
        assert_eq!(redis.ca_file.as_deref(), Some("ca.crt"));
        assert_eq!(redis.cert_file.as_deref(), Some("client.crt"));
        assert_eq!(redis.key_file.as_deref(), Some("client.key"));
        assert_eq!(redis.sni.as_deref(), Some("my-alt-domain"));
    }

    #[tokio::test]
    async fn test_explicit_beats_wildcard() {
        let catalog = Arc::new(MemoryCatalog::new("dc1"));
        for name in ["c", "a", "b"] {
            register(&catalog, "node", name, ServiceKind::Typical).await;
        }
        catalog
            .upsert_config_entry(ConfigEntry::TerminatingGateway {
                name: "gw".to_string(),
                services: vec![tls("a", "a/", "a.example"), LinkedService::named("*")],
                modify_index: 0,
            })
            .await;
        let gateways = resolver(catalog, open());

        let links = gateways.gateway_services("dc1", "gw", None).await.unwrap().value;
        let resolved: Vec<_> = links.iter().map(|l| (l.service.as_str(), l.from_wildcard)).collect();
        assert_eq!(resolved, vec![("a", false), ("b", true), ("c", true)]);
        assert_eq!(links[0].sni.as_deref(), Some("a.example"));
    }

    #[tokio::test]
    async fn test_ingress_gateway_services() {
        let gateways = resolver(mesh().await, open());

        let links = gateways.gateway_services("dc1", "ingress", None).await.unwrap().value;
        assert_eq!(links.len(), 2);

        assert_eq!(links[0].service, "db");
        assert_eq!(links[0].gateway_kind, GatewayKind::IngressGateway);
        assert_eq!(links[0].port, Some(8888));
        assert_eq!(links[0].protocol.as_deref(), Some("tcp"));
        assert!(links[0].sni.is_none());

        assert_eq!(links[1].service, "api");
        assert_eq!(links[1].port, Some(9999));
    }

    #[tokio::test]
    async fn test_ingress_wildcard_rejected() {
        let catalog = Arc::new(MemoryCatalog::new("dc1"));
        catalog
            .upsert_config_entry(ConfigEntry::IngressGateway {
                name: "ingress".to_string(),
                listeners: vec![IngressListener {
                    port: 8080,
                    protocol: "tcp".to_string(),
                    services: vec![IngressService { name: "*".to_string() }],
                }],
                modify_index: 0,
            })
            .await;
        let gateways = resolver(catalog, open());

        let err = gateways.gateway_services("dc1", "ingress", None).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_not_a_gateway() {
        let gateways = resolver(mesh().await, open());

        let err = gateways.gateway_services("dc1", "api", None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"service "api" is not a configured terminating-gateway or ingress-gateway"#
        );
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let gateways = resolver(mesh().await, open());

        let first = gateways.gateway_services("dc1", "gateway", None).await.unwrap();
        let second = gateways.gateway_services("dc1", "gateway", None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_gateway_acl() {
        let catalog = mesh().await;
        catalog
            .upsert_config_entry(ConfigEntry::TerminatingGateway {
                name: "gateway".to_string(),
                services: vec![
                    LinkedService::named("api"),
                    LinkedService::named("db"),
                    LinkedService::named("db_replica"),
                ],
                modify_index: 0,
            })
            .await;

        let acl = |rules: Vec<Rule>| {
            Redactor::new(Arc::new(RuleAuthorizer::new(&AclConfig {
                enabled: true,
                default_policy: DefaultPolicy::Deny,
                master_token: None,
                anonymous_rules: vec![],
                tokens: vec![TokenConfig {
                    secret: "token".to_string(),
                    description: String::new(),
                    rules,
                }],
            })))
        };
        let token = Some("token");

        let prefix_only = resolver(
            catalog.clone(),
            acl(vec![Rule::new(RuleResource::ServicePrefix, "db", PolicyLevel::Read)]),
        );
        let err = prefix_only.gateway_services("dc1", "gateway", token).await.unwrap_err();
        assert!(err.is_permission_denied());

        let gateway_only = resolver(
            catalog.clone(),
            acl(vec![Rule::new(RuleResource::Service, "gateway", PolicyLevel::Read)]),
        );
        let links = gateway_only.gateway_services("dc1", "gateway", token).await.unwrap();
        assert!(links.value.is_empty());

        let both = resolver(
            catalog,
            acl(vec![
                Rule::new(RuleResource::Service, "gateway", PolicyLevel::Read),
                Rule::new(RuleResource::ServicePrefix, "db", PolicyLevel::Read),
            ]),
        );
        let links = both.gateway_services("dc1", "gateway", token).await.unwrap().value;
        let names: Vec<_> = links.iter().map(|l| l.service.as_str()).collect();
        assert_eq!(names, vec!["db", "db_replica"]);
    }
}
