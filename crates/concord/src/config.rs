//! Configuration management for Concord.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use concord_common::constants::{
    DEFAULT_DATACENTER, DEFAULT_KEYRING_CALL_TIMEOUT_MS, DEFAULT_KEYRING_DEADLINE_MS, DEFAULT_LISTEN_ADDR,
};

use concord::acl::AclConfig;
use concord::cluster::{KeyringSettings, validate_key};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Local datacenter
    #[serde(default = "default_datacenter")]
    pub datacenter: String,

    /// This node's name (auto-generated if not set)
    #[serde(default = "generate_node_name")]
    pub node_name: String,

    /// JSON file with catalog registrations and config entries
    #[serde(default)]
    pub seed_path: Option<String>,

    /// Initial gossip encryption key (base64)
    #[serde(default)]
    pub encrypt: Option<String>,

    /// ACL configuration
    #[serde(default)]
    pub acl: AclConfig,

    /// Keyring fan-out timeouts
    #[serde(default)]
    pub keyring: KeyringConfig,
}

/// Keyring fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeyringConfig {
    /// Per-member call timeout in milliseconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Overall request deadline in milliseconds
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout(),
            deadline_ms: default_deadline(),
        }
    }
}

impl KeyringConfig {
    pub fn settings(&self) -> KeyringSettings {
        KeyringSettings {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            deadline: Duration::from_millis(self.deadline_ms),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_datacenter() -> String { DEFAULT_DATACENTER.to_string() }
fn default_call_timeout() -> u64 { DEFAULT_KEYRING_CALL_TIMEOUT_MS }
fn default_deadline() -> u64 { DEFAULT_KEYRING_DEADLINE_MS }

fn generate_node_name() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    format!("node-{:08x}", rng.random::<u32>())
}

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;

        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref datacenter) = args.datacenter {
            config.datacenter = datacenter.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(config_path: &str) -> Result<Self> {
        if !Path::new(config_path).exists() {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .build()
            .context("Failed to load config file")?;

        settings.try_deserialize().context("Failed to parse config")
    }

    fn validate(&self) -> Result<()> {
        if self.datacenter.is_empty() {
            anyhow::bail!("datacenter must not be empty");
        }
        if let Some(key) = &self.encrypt {
            validate_key(key).context("Invalid encrypt key")?;
        }
        if self.keyring.call_timeout_ms == 0 {
            anyhow::bail!("keyring.call_timeout_ms must be at least 1");
        }
        if self.keyring.deadline_ms == 0 {
            anyhow::bail!("keyring.deadline_ms must be at least 1");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            datacenter: default_datacenter(),
            node_name: generate_node_name(),
            seed_path: None,
            encrypt: None,
            acl: AclConfig::default(),
            keyring: KeyringConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord::acl::DefaultPolicy;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.datacenter, "dc1");
        assert!(config.node_name.starts_with("node-"));
        assert!(!config.acl.enabled);
        assert_eq!(
            config.keyring.settings().call_timeout,
            Duration::from_millis(DEFAULT_KEYRING_CALL_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_toml_sections() {
        let toml = r#"
            datacenter = "east"
            encrypt = "H1dfkSZOVnP/JUnaBfTzXg=="

            [acl]
            enabled = true
            default_policy = "deny"
            master_token = "root"

            [[acl.tokens]]
            secret = "ops"
            rules = [{ resource = "keyring", policy = "write" }]

            [keyring]
            call_timeout_ms = 250
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.datacenter, "east");
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.acl.default_policy, DefaultPolicy::Deny);
        assert_eq!(config.acl.tokens[0].rules.len(), 1);
        assert_eq!(config.keyring.call_timeout_ms, 250);
        assert_eq!(config.keyring.deadline_ms, DEFAULT_KEYRING_DEADLINE_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_encrypt_key() {
        let config = AppConfig {
            encrypt: Some("short".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_keyring_timeouts_rejected() {
        let mut config = AppConfig::default();
        config.keyring.call_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("call_timeout_ms"));

        let mut config = AppConfig::default();
        config.keyring.deadline_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("deadline_ms"));
    }
}
