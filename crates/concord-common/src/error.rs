//! Common error types for Concord components.

use thiserror::Error;

/// Errors surfaced by the query and coordination layer.
///
/// Partial failures inside a gossip pool are never represented here; they
/// are carried as counters on [`crate::KeyringPoolResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcordError {
    /// Request rejected before any external call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filter expression could not be parsed
    #[error("Failed to compile filter at position {position}: {reason}")]
    FilterCompile { reason: String, position: usize },

    /// Named resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// Caller may not access the primary resource of the request
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An entire gossip pool could not be contacted
    #[error("Pool unreachable in datacenter {datacenter}: {reason}")]
    UnreachablePool { datacenter: String, reason: String },

    /// The request deadline expired before every pool answered
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Collaborator or internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConcordError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::FilterCompile { .. } => 400,
            Self::NotFound(_) => 404,
            Self::PermissionDenied(_) => 403,
            Self::UnreachablePool { .. } => 503,
            Self::DeadlineExceeded(_) => 504,
            Self::Internal(_) => 500,
        }
    }

    /// Malformed filters count as validation failures
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::FilterCompile { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true if a caller may reasonably retry at a higher level.
    /// Nothing inside this layer retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UnreachablePool { .. } | Self::DeadlineExceeded(_) | Self::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConcordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = ConcordError::FilterCompile {
            reason: "unexpected token".to_string(),
            position: 4,
        };
        assert!(err.is_validation());
        assert_eq!(err.status_code(), 400);
        assert!(!err.is_retryable());

        let err = ConcordError::permission_denied("gateway");
        assert!(err.is_permission_denied());
        assert_eq!(err.status_code(), 403);

        let err = ConcordError::UnreachablePool {
            datacenter: "dc3".to_string(),
            reason: "no path".to_string(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("dc3"));
    }
}
