//! Cluster coordination.
//!
//! Implements:
//! - Gossip pool access (LAN per datacenter, one shared WAN pool)
//! - Keyring fan-out across pools with partial-failure aggregation
//! - User event delivery

mod events;
mod keyring;
mod memory;
mod pools;

pub use events::{BroadcastEventSink, EventSink, event_watcher};
pub use keyring::{KeyringCoordinator, KeyringRequest, KeyringSettings, validate_key};
pub use memory::MemoryPools;
pub use pools::{GossipPools, KeyOperation, Member, MemberStatus, PoolId, PoolSet};
