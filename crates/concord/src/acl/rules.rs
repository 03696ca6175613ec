//! Static rule-based policy engine.
//!
//! Tokens carry rule sets over nodes, services, events and the keyring.
//! Exact rules beat prefix rules, the longest prefix wins, and `write`
//! implies `read`. Anything without a matching rule falls back to the
//! default policy.

use serde::Deserialize;
use std::collections::HashMap;

use super::{Access, Authorizer, Decision, Resource};

/// Default decision when no rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyLevel {
    Deny,
    Read,
    Write,
}

impl PolicyLevel {
    fn allows(self, access: Access) -> bool {
        match (self, access) {
            (Self::Write, _) => true,
            (Self::Read, Access::Read) => true,
            _ => false,
        }
    }
}

/// What a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleResource {
    Node,
    NodePrefix,
    Service,
    ServicePrefix,
    Event,
    EventPrefix,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    pub resource: RuleResource,
    /// Exact name or prefix; ignored for the keyring
    #[serde(default)]
    pub name: String,
    pub policy: PolicyLevel,
}

impl Rule {
    pub fn new(resource: RuleResource, name: &str, policy: PolicyLevel) -> Self {
        Self {
            resource,
            name: name.to_string(),
            policy,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// ACL section of the application config
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AclConfig {
    /// Disabled ACLs grant everything
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub default_policy: DefaultPolicy,

    /// Token that bypasses every rule
    #[serde(default)]
    pub master_token: Option<String>,

    /// Rules applied to requests without a known token
    #[serde(default)]
    pub anonymous_rules: Vec<Rule>,

    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// Rule-based [`Authorizer`]
pub struct RuleAuthorizer {
    enabled: bool,
    default_policy: DefaultPolicy,
    master_token: Option<String>,
    anonymous: Vec<Rule>,
    tokens: HashMap<String, Vec<Rule>>,
}

impl RuleAuthorizer {
    pub fn new(config: &AclConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| (t.secret.clone(), t.rules.clone()))
            .collect();

        Self {
            enabled: config.enabled,
            default_policy: config.default_policy,
            master_token: config.master_token.clone(),
            anonymous: config.anonymous_rules.clone(),
            tokens,
        }
    }

    /// Authorizer with ACLs turned off
    pub fn disabled() -> Self {
        Self::new(&AclConfig::default())
    }

    fn rules_for(&self, token: Option<&str>) -> &[Rule] {
        token
            .and_then(|secret| self.tokens.get(secret))
            .map_or(self.anonymous.as_slice(), Vec::as_slice)
    }
}

/// Most specific policy for a name: exact match first, then longest prefix
fn resolve_named(
    rules: &[Rule],
    exact: RuleResource,
    prefix: RuleResource,
    name: &str,
) -> Option<PolicyLevel> {
    if let Some(rule) = rules.iter().find(|r| r.resource == exact && r.name == name) {
        return Some(rule.policy);
    }

    rules
        .iter()
        .filter(|r| r.resource == prefix && name.starts_with(r.name.as_str()))
        .max_by_key(|r| r.name.len())
        .map(|r| r.policy)
}

impl Authorizer for RuleAuthorizer {
    fn authorize(&self, token: Option<&str>, resource: Resource<'_>, access: Access) -> Decision {
        if !self.enabled {
            return Decision::Allow;
        }
        if let (Some(master), Some(token)) = (&self.master_token, token) {
            if master == token {
                return Decision::Allow;
            }
        }

        let rules = self.rules_for(token);
        let level = match resource {
            Resource::Node(name) => {
                resolve_named(rules, RuleResource::Node, RuleResource::NodePrefix, name)
            }
            Resource::Service(name) => {
                resolve_named(rules, RuleResource::Service, RuleResource::ServicePrefix, name)
            }
            Resource::Event(name) => {
                resolve_named(rules, RuleResource::Event, RuleResource::EventPrefix, name)
            }
            Resource::Keyring => rules
                .iter()
                .find(|r| r.resource == RuleResource::Keyring)
                .map(|r| r.policy),
        };

        let allowed = match level {
            Some(level) => level.allows(access),
            None => self.default_policy == DefaultPolicy::Allow,
        };

        if allowed { Decision::Allow } else { Decision::Deny }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorizer(rules: Vec<Rule>) -> RuleAuthorizer {
        RuleAuthorizer::new(&AclConfig {
            enabled: true,
            default_policy: DefaultPolicy::Deny,
            master_token: Some("root".to_string()),
            anonymous_rules: vec![],
            tokens: vec![TokenConfig {
                secret: "svc-token".to_string(),
                description: "test".to_string(),
                rules,
            }],
        })
    }

    #[test]
    fn test_disabled_allows_everything() {
        let acl = RuleAuthorizer::disabled();
        assert_eq!(
            acl.authorize(None, Resource::Keyring, Access::Write),
            Decision::Allow
        );
    }

    #[test]
    fn test_master_token_and_anonymous() {
        let acl = authorizer(vec![]);
        assert_eq!(
            acl.authorize(Some("root"), Resource::Event("foo"), Access::Write),
            Decision::Allow
        );
        assert_eq!(
            acl.authorize(None, Resource::Event("foo"), Access::Write),
            Decision::Deny
        );
        assert_eq!(
            acl.authorize(Some("unknown"), Resource::Service("db"), Access::Read),
            Decision::Deny
        );
    }

    #[test]
    fn test_exact_beats_prefix() {
        let acl = authorizer(vec![
            Rule::new(RuleResource::ServicePrefix, "db", PolicyLevel::Read),
            Rule::new(RuleResource::Service, "db_secret", PolicyLevel::Deny),
            Rule::new(RuleResource::ServicePrefix, "", PolicyLevel::Deny),
        ]);
        let token = Some("svc-token");

        assert_eq!(acl.authorize(token, Resource::Service("db"), Access::Read), Decision::Allow);
        assert_eq!(
            acl.authorize(token, Resource::Service("db_replica"), Access::Read),
            Decision::Allow
        );
        assert_eq!(
            acl.authorize(token, Resource::Service("db_secret"), Access::Read),
            Decision::Deny
        );
        assert_eq!(acl.authorize(token, Resource::Service("api"), Access::Read), Decision::Deny);
        // read does not grant write
        assert_eq!(acl.authorize(token, Resource::Service("db"), Access::Write), Decision::Deny);
    }

    #[test]
    fn test_write_implies_read() {
        let acl = authorizer(vec![Rule::new(RuleResource::Keyring, "", PolicyLevel::Write)]);
        assert_eq!(
            acl.authorize(Some("svc-token"), Resource::Keyring, Access::Read),
            Decision::Allow
        );
    }

    #[test]
    fn test_config_deserialize() {
        let json = r#"{
            "enabled": true,
            "default_policy": "deny",
            "tokens": [{"secret": "abc", "rules": [
                {"resource": "service_prefix", "name": "db", "policy": "read"},
                {"resource": "keyring", "policy": "write"}
            ]}]
        }"#;
        let config: AclConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.default_policy, DefaultPolicy::Deny);
        assert_eq!(config.tokens[0].rules[1].resource, RuleResource::Keyring);
    }
}
