//! Shared constants for Concord components.

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8500";

/// Default datacenter name
pub const DEFAULT_DATACENTER: &str = "dc1";

/// Sentinel service name for wildcard gateway entries
pub const WILDCARD_SERVICE: &str = "*";

/// The cluster's own service, never fronted by wildcard gateway entries
pub const CLUSTER_SERVICE_NAME: &str = "consul";

/// Maximum combined size of a user event's name and payload
pub const USER_EVENT_SIZE_LIMIT: usize = 512;

/// Valid gossip encryption key lengths in bytes (AES-128/192/256)
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Default per-member keyring call timeout (milliseconds)
pub const DEFAULT_KEYRING_CALL_TIMEOUT_MS: u64 = 5_000;

/// Default overall keyring request deadline (milliseconds)
pub const DEFAULT_KEYRING_DEADLINE_MS: u64 = 30_000;

/// HTTP header names
pub mod headers {
    /// ACL token header
    pub const X_CONCORD_TOKEN: &str = "X-Concord-Token";

    /// Index of the snapshot a response was built from
    pub const X_CONCORD_INDEX: &str = "X-Concord-Index";
}
