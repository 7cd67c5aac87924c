//! Load balancer error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Errors that can occur in the load balancer.
#[derive(Debug, Error)]
pub enum LoadBalancerError {
    /// Invalid input (empty identity, zero frequency, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Provider identity is already present in the registry.
    #[error("provider '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Provider identity is not present in the registry.
    #[error("provider '{0}' is not registered")]
    NotRegistered(String),

    /// No trace record exists for the identity.
    #[error("no trace record for '{0}'")]
    UnknownTraceable(String),

    /// Registration would exceed the pool capacity.
    #[error("capacity exceeded: {requested} requested, {free} of {capacity} slots free")]
    CapacityExceeded {
        /// Configured pool capacity.
        capacity: usize,
        /// Number of providers the call tried to admit.
        requested: usize,
        /// Free slots at the time of the call.
        free: usize,
    },

    /// Observer state diverged from the registry (wiring bug).
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Heartbeat monitors need a tokio runtime.
    #[error("no tokio runtime available to drive heartbeat monitors")]
    RuntimeUnavailable,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadBalancerError::AlreadyRegistered("p1".to_string());
        assert_eq!(err.to_string(), "provider 'p1' is already registered");

        let err = LoadBalancerError::CapacityExceeded {
            capacity: 3,
            requested: 2,
            free: 1,
        };
        assert_eq!(
            err.to_string(),
            "capacity exceeded: 2 requested, 1 of 3 slots free"
        );
    }

    #[test]
    fn test_error_from_config() {
        let err: LoadBalancerError = ConfigError::ValidationError("bad".to_string()).into();
        assert!(matches!(err, LoadBalancerError::Config(_)));
    }
}
