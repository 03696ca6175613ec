//! Authorization for query results.
//!
//! The policy engine itself is a capability ([`Authorizer`]); this module
//! only decides what a caller gets to see once a result has been computed.
//!
//! - `redactor` - per-record visibility filtering
//! - `rules` - static rule-based policy engine

mod redactor;
mod rules;

pub use redactor::Redactor;
pub use rules::{AclConfig, DefaultPolicy, PolicyLevel, Rule, RuleAuthorizer, RuleResource, TokenConfig};

/// A resource a token may be authorized against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    Node(&'a str),
    Service(&'a str),
    Event(&'a str),
    Keyring,
}

impl Resource<'_> {
    /// Name the resource in permission errors
    pub fn describe(&self) -> String {
        match self {
            Self::Node(name) => format!("node {name:?}"),
            Self::Service(name) => format!("service {name:?}"),
            Self::Event(name) => format!("event {name:?}"),
            Self::Keyring => "keyring".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Policy engine: decides whether a token may access a named resource
pub trait Authorizer: Send + Sync {
    fn authorize(&self, token: Option<&str>, resource: Resource<'_>, access: Access) -> Decision;
}
