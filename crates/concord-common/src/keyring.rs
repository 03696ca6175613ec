//! Gossip keyring operations and their per-pool results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ConcordError;

/// Keyring operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyringOp {
    List,
    Install,
    Use,
    Remove,
}

impl KeyringOp {
    /// Everything except `list` changes key material
    pub fn is_destructive(&self) -> bool {
        !matches!(self, Self::List)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Install => "install",
            Self::Use => "use",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for KeyringOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single member reports back for a keyring operation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberKeyReport {
    /// Installed keys (base64), populated for list operations
    pub keys: Vec<String>,
    /// Primary key (base64), populated for list operations
    pub primary_key: Option<String>,
}

/// Summary of one gossip pool's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct KeyringPoolResponse {
    #[serde(rename = "WAN")]
    pub wan: bool,
    pub datacenter: String,
    /// Key -> number of members reporting it
    pub keys: BTreeMap<String, usize>,
    /// Primary key -> number of members using it
    pub primary_keys: BTreeMap<String, usize>,
    /// Member name -> failure message
    pub messages: BTreeMap<String, String>,
    /// Live members the operation was sent to
    pub num_nodes: usize,
    /// Members that failed or never answered
    pub num_failed: usize,
    /// Set when at least one member failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KeyringPoolResponse {
    pub fn new(datacenter: impl Into<String>, wan: bool) -> Self {
        Self {
            wan,
            datacenter: datacenter.into(),
            ..Default::default()
        }
    }

    /// Healthy means every targeted member answered
    pub fn is_degraded(&self) -> bool {
        self.num_failed > 0
    }
}

/// Aggregate keyring result: one response per reachable targeted pool plus
/// the top-level errors for pools that could not be consulted at all
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyringResponses {
    pub responses: Vec<KeyringPoolResponse>,
    pub errors: Vec<ConcordError>,
}

impl KeyringResponses {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// First top-level error, if any pool was skipped
    pub fn error(&self) -> Option<&ConcordError> {
        self.errors.first()
    }

    pub fn wan_count(&self) -> usize {
        self.responses.iter().filter(|r| r.wan).count()
    }

    pub fn lan_count(&self) -> usize {
        self.responses.iter().filter(|r| !r.wan).count()
    }
}
