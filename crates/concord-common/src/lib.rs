//! # Concord Common
//!
//! Shared types, errors, and constants used across Concord components.
//!
//! ## Modules
//! - `types` - Catalog records and composite views
//! - `gateway` - Gateway config entries and derived links
//! - `keyring` - Keyring operations and per-pool responses
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod gateway;
pub mod keyring;
pub mod types;

pub use error::{ConcordError, Result};
pub use gateway::*;
pub use keyring::*;
pub use types::*;
