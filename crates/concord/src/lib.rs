//! # Concord - internal query and coordination layer
//!
//! Serves filtered, authorization-aware views over a catalog snapshot,
//! resolves which services a gateway fronts, and runs keyring operations
//! across every gossip pool in the cluster.
//!
//! ## Architecture
//! ```text
//! views   → filter → acl::redactor
//! gateway ────────→ acl::redactor
//! cluster::keyring → GossipPools (LAN, WAN, remote LANs)
//! ```

pub mod acl;
pub mod catalog;
pub mod cluster;
pub mod filter;
pub mod gateway;
pub mod internal;
pub mod views;

pub use internal::{Collaborators, Internal};
pub use views::QueryOptions;
