//! Declarative gateway configuration and the links derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::WILDCARD_SERVICE;

/// Kind of a config entry, used as half of its key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigEntryKind {
    TerminatingGateway,
    IngressGateway,
}

impl ConfigEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TerminatingGateway => "terminating-gateway",
            Self::IngressGateway => "ingress-gateway",
        }
    }
}

impl fmt::Display for ConfigEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a terminating gateway reaches one backend service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct LinkedService {
    /// Backend service name, or `*`
    pub name: String,
    #[serde(rename = "CAFile", default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(rename = "SNI", default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

impl LinkedService {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD_SERVICE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressService {
    pub name: String,
}

/// One ingress listener and the services it exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressListener {
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub services: Vec<IngressService>,
}

fn default_protocol() -> String { "tcp".to_string() }

/// A declarative configuration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Kind", rename_all = "kebab-case")]
pub enum ConfigEntry {
    #[serde(rename_all = "PascalCase")]
    TerminatingGateway {
        name: String,
        #[serde(default)]
        services: Vec<LinkedService>,
        #[serde(default)]
        modify_index: u64,
    },
    #[serde(rename_all = "PascalCase")]
    IngressGateway {
        name: String,
        #[serde(default)]
        listeners: Vec<IngressListener>,
        #[serde(default)]
        modify_index: u64,
    },
}

impl ConfigEntry {
    pub fn kind(&self) -> ConfigEntryKind {
        match self {
            Self::TerminatingGateway { .. } => ConfigEntryKind::TerminatingGateway,
            Self::IngressGateway { .. } => ConfigEntryKind::IngressGateway,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::TerminatingGateway { name, .. } | Self::IngressGateway { name, .. } => name,
        }
    }

    pub fn modify_index(&self) -> u64 {
        match self {
            Self::TerminatingGateway { modify_index, .. } | Self::IngressGateway { modify_index, .. } => {
                *modify_index
            }
        }
    }

    pub fn set_modify_index(&mut self, index: u64) {
        match self {
            Self::TerminatingGateway { modify_index, .. } | Self::IngressGateway { modify_index, .. } => {
                *modify_index = index
            }
        }
    }
}

/// Gateway kinds that can front other services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayKind {
    TerminatingGateway,
    IngressGateway,
}

/// A resolved (service, gateway) pair. Computed per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayServiceLink {
    pub service: String,
    pub gateway: String,
    pub gateway_kind: GatewayKind,
    /// Listener port for ingress gateways
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(rename = "CAFile", default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(rename = "SNI", default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default)]
    pub from_wildcard: bool,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl GatewayServiceLink {
    /// Link for a terminating gateway, carrying the entry's TLS settings
    pub fn terminating(gateway: &str, service: &str, entry: &LinkedService, from_wildcard: bool) -> Self {
        Self {
            service: service.to_string(),
            gateway: gateway.to_string(),
            gateway_kind: GatewayKind::TerminatingGateway,
            port: None,
            protocol: None,
            ca_file: entry.ca_file.clone(),
            cert_file: entry.cert_file.clone(),
            key_file: entry.key_file.clone(),
            sni: entry.sni.clone(),
            from_wildcard,
            create_index: 0,
            modify_index: 0,
        }
    }

    /// Link for an ingress listener; TLS is configured elsewhere
    pub fn ingress(gateway: &str, service: &str, listener: &IngressListener) -> Self {
        Self {
            service: service.to_string(),
            gateway: gateway.to_string(),
            gateway_kind: GatewayKind::IngressGateway,
            port: Some(listener.port),
            protocol: Some(listener.protocol.clone()),
            ca_file: None,
            cert_file: None,
            key_file: None,
            sni: None,
            from_wildcard: false,
            create_index: 0,
            modify_index: 0,
        }
    }
}
