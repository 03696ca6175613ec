//! Per-record visibility filtering.
//!
//! Filtering happens after results are computed. A record the caller may
//! not read is dropped entirely; nothing is replaced with a placeholder.

use concord_common::{ConcordError, GatewayServiceLink, HealthCheck, NodeDumpRecord, ServiceDumpRecord};
use std::sync::Arc;

use super::{Access, Authorizer, Decision, Resource};

/// Applies an [`Authorizer`] to query results
#[derive(Clone)]
pub struct Redactor {
    authorizer: Arc<dyn Authorizer>,
}

impl Redactor {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }

    /// Only an explicit allow grants access
    fn allowed(&self, token: Option<&str>, resource: Resource<'_>, access: Access) -> bool {
        self.authorizer.authorize(token, resource, access) == Decision::Allow
    }

    fn can_read_node(&self, token: Option<&str>, node: &str) -> bool {
        self.allowed(token, Resource::Node(node), Access::Read)
    }

    fn can_read_service(&self, token: Option<&str>, service: &str) -> bool {
        self.allowed(token, Resource::Service(service), Access::Read)
    }

    /// Node-level checks follow the node; service checks follow their service
    fn check_visible(&self, token: Option<&str>, check: &HealthCheck) -> bool {
        if check.is_node_level() {
            return true;
        }
        self.can_read_service(token, &check.service_name)
    }

    /// Drop invisible nodes, then strip services and checks the token may
    /// not read from the nodes that remain
    pub fn filter_nodes(&self, token: Option<&str>, records: Vec<NodeDumpRecord>) -> Vec<NodeDumpRecord> {
        let before = records.len();

        let visible: Vec<NodeDumpRecord> = records
            .into_iter()
            .filter(|record| self.can_read_node(token, &record.node))
            .map(|mut record| {
                record.services.retain(|svc| self.can_read_service(token, &svc.service));
                record.checks.retain(|check| self.check_visible(token, check));
                record
            })
            .collect();

        if visible.len() != before {
            tracing::debug!(
                before = before,
                after = visible.len(),
                "Redacted nodes from dump"
            );
        }
        visible
    }

    /// A service row is visible when both its node and its service are
    pub fn filter_service_dump(
        &self,
        token: Option<&str>,
        records: Vec<ServiceDumpRecord>,
    ) -> Vec<ServiceDumpRecord> {
        let before = records.len();

        let visible: Vec<ServiceDumpRecord> = records
            .into_iter()
            .filter(|record| {
                self.can_read_node(token, &record.node.name)
                    && self.can_read_service(token, &record.service.service)
            })
            .map(|mut record| {
                record.checks.retain(|check| self.check_visible(token, check));
                record
            })
            .collect();

        if visible.len() != before {
            tracing::debug!(
                before = before,
                after = visible.len(),
                "Redacted service instances from dump"
            );
        }
        visible
    }

    /// Reading a gateway's links needs service read on the gateway
    pub fn authorize_gateway(&self, token: Option<&str>, gateway: &str) -> Result<(), ConcordError> {
        if self.can_read_service(token, gateway) {
            return Ok(());
        }
        Err(ConcordError::permission_denied(format!(
            "read access to {} required",
            Resource::Service(gateway).describe()
        )))
    }

    /// Gateway links need read on the gateway itself (otherwise the whole
    /// request is refused) and on each linked backend service.
    pub fn filter_service_links(
        &self,
        token: Option<&str>,
        gateway: &str,
        links: Vec<GatewayServiceLink>,
    ) -> Result<Vec<GatewayServiceLink>, ConcordError> {
        self.authorize_gateway(token, gateway)?;

        Ok(links
            .into_iter()
            .filter(|link| {
                self.can_read_service(token, &link.gateway)
                    && self.can_read_service(token, &link.service)
            })
            .collect())
    }

    /// Firing an event needs event write; fails closed
    pub fn authorize_event_fire(&self, token: Option<&str>, event: &str) -> bool {
        self.allowed(token, Resource::Event(event), Access::Write)
    }

    /// Listing keys needs keyring read, everything else keyring write
    pub fn authorize_keyring(&self, token: Option<&str>, access: Access) -> bool {
        self.allowed(token, Resource::Keyring, access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AclConfig, DefaultPolicy, PolicyLevel, Rule, RuleAuthorizer, RuleResource, TokenConfig};
    use concord_common::{GatewayKind, HealthStatus, LinkedService, Node, ServiceInstance};
    use std::collections::BTreeMap;

    const TOKEN: Option<&str> = Some("token");

    fn redactor(rules: Vec<Rule>) -> Redactor {
        let acl = RuleAuthorizer::new(&AclConfig {
            enabled: true,
            default_policy: DefaultPolicy::Deny,
            master_token: Some("root".to_string()),
            anonymous_rules: vec![],
            tokens: vec![TokenConfig {
                secret: "token".to_string(),
                description: String::new(),
                rules,
            }],
        });
        Redactor::new(Arc::new(acl))
    }

    fn check(node: &str, service: &str) -> HealthCheck {
        HealthCheck {
            node: node.to_string(),
            check_id: format!("{service}-check"),
            name: service.to_string(),
            status: HealthStatus::Passing,
            service_id: service.to_string(),
            service_name: service.to_string(),
            output: String::new(),
        }
    }

    fn service(name: &str) -> ServiceInstance {
        ServiceInstance {
            id: name.to_string(),
            service: name.to_string(),
            ..Default::default()
        }
    }

    fn node_record(name: &str) -> NodeDumpRecord {
        let mut serf = check(name, "");
        serf.check_id = "serfHealth".to_string();
        serf.name = "Serf Health Status".to_string();

        NodeDumpRecord {
            id: String::new(),
            node: name.to_string(),
            address: "127.0.0.1".to_string(),
            datacenter: "dc1".to_string(),
            meta: BTreeMap::new(),
            services: vec![service("foo"), service("bar")],
            checks: vec![check(name, "foo"), check(name, "bar"), serf],
        }
    }

    fn link(service: &str) -> GatewayServiceLink {
        GatewayServiceLink::terminating("gateway", service, &LinkedService::named(service), false)
    }

    #[test]
    fn test_filter_nodes_strips_unreadable_services_and_checks() {
        let redactor = redactor(vec![
            Rule::new(RuleResource::NodePrefix, "", PolicyLevel::Read),
            Rule::new(RuleResource::Service, "foo", PolicyLevel::Read),
        ]);

        let nodes = redactor.filter_nodes(TOKEN, vec![node_record("n1")]);
        assert_eq!(nodes.len(), 1);

        let names: Vec<_> = nodes[0].services.iter().map(|s| s.service.as_str()).collect();
        assert_eq!(names, vec!["foo"]);

        // The check for "bar" is gone even though the node is visible
        assert!(nodes[0].checks.iter().all(|c| c.service_name != "bar"));
        assert!(nodes[0].checks.iter().any(|c| c.service_name == "foo"));
        assert!(nodes[0].checks.iter().any(|c| c.is_node_level()));
    }

    #[test]
    fn test_filter_nodes_drops_unreadable_nodes() {
        let redactor = redactor(vec![
            Rule::new(RuleResource::Node, "n1", PolicyLevel::Read),
            Rule::new(RuleResource::ServicePrefix, "", PolicyLevel::Read),
        ]);

        let nodes = redactor.filter_nodes(TOKEN, vec![node_record("n1"), node_record("n2")]);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node, "n1");
        assert_eq!(nodes[0].services.len(), 2);
    }

    #[test]
    fn test_revoking_service_only_removes_that_service() {
        let full = redactor(vec![
            Rule::new(RuleResource::NodePrefix, "", PolicyLevel::Read),
            Rule::new(RuleResource::ServicePrefix, "", PolicyLevel::Read),
        ]);
        let revoked = redactor(vec![
            Rule::new(RuleResource::NodePrefix, "", PolicyLevel::Read),
            Rule::new(RuleResource::ServicePrefix, "", PolicyLevel::Read),
            Rule::new(RuleResource::Service, "bar", PolicyLevel::Deny),
        ]);

        let before = full.filter_nodes(TOKEN, vec![node_record("n1")]);
        let after = revoked.filter_nodes(TOKEN, vec![node_record("n1")]);

        let mut expected = before[0].clone();
        expected.services.retain(|s| s.service != "bar");
        expected.checks.retain(|c| c.service_name != "bar");
        assert_eq!(after[0], expected);
    }

    #[test]
    fn test_service_dump_requires_node_and_service() {
        let redactor = redactor(vec![
            Rule::new(RuleResource::Node, "n1", PolicyLevel::Read),
            Rule::new(RuleResource::Service, "foo", PolicyLevel::Read),
        ]);

        let row = |node: &str, svc: &str| ServiceDumpRecord {
            node: Node {
                name: node.to_string(),
                ..Default::default()
            },
            service: service(svc),
            checks: vec![check(node, svc)],
        };

        let rows = redactor.filter_service_dump(
            TOKEN,
            vec![row("n1", "foo"), row("n1", "bar"), row("n2", "foo")],
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].service.service, "foo");
        assert_eq!(rows[0].checks.len(), 1);
    }

    #[test]
    fn test_gateway_links_without_gateway_read() {
        let redactor = redactor(vec![Rule::new(RuleResource::ServicePrefix, "db", PolicyLevel::Read)]);

        let err = redactor
            .filter_service_links(TOKEN, "gateway", vec![link("db")])
            .unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_gateway_links_need_backend_read() {
        let gateway_only = redactor(vec![Rule::new(RuleResource::Service, "gateway", PolicyLevel::Read)]);
        let links = gateway_only
            .filter_service_links(TOKEN, "gateway", vec![link("api"), link("db")])
            .unwrap();
        assert!(links.is_empty());

        let both = redactor(vec![
            Rule::new(RuleResource::Service, "gateway", PolicyLevel::Read),
            Rule::new(RuleResource::ServicePrefix, "db", PolicyLevel::Read),
        ]);
        let links = both
            .filter_service_links(TOKEN, "gateway", vec![link("api"), link("db"), link("db_replica")])
            .unwrap();
        let names: Vec<_> = links.iter().map(|l| l.service.as_str()).collect();
        assert_eq!(names, vec!["db", "db_replica"]);
        assert!(links.iter().all(|l| l.gateway_kind == GatewayKind::TerminatingGateway));
    }

    #[test]
    fn test_event_fire_fails_closed() {
        let redactor = redactor(vec![Rule::new(RuleResource::EventPrefix, "deploy", PolicyLevel::Write)]);

        assert!(!redactor.authorize_event_fire(None, "foo"));
        assert!(!redactor.authorize_event_fire(TOKEN, "foo"));
        assert!(redactor.authorize_event_fire(TOKEN, "deploy-web"));
        assert!(redactor.authorize_event_fire(Some("root"), "foo"));
    }
}
