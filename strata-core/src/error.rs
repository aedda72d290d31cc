//! Error types for STRATA operations

use thiserror::Error;

/// Transport layer errors.
///
/// Carried by every subscriber of a shared fetch, so the type is `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Failed to decode response body: {reason}")]
    Decode { reason: String },
}

impl TransportError {
    /// HTTP status for status failures, `None` for network and decode failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { .. } | Self::Decode { .. } => None,
        }
    }
}

/// A fetched payload did not match the expected record shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapingError {
    #[error("Expected {expected}, found {found}")]
    UnexpectedShape { expected: &'static str, found: String },

    #[error("Record at index {index} is not an object")]
    NotAnObject { index: usize },

    #[error("Record at index {index} has no usable id")]
    MissingId { index: usize },

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// A remote write failed. Any optimistic patch from the same call is rolled back.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Mutation {endpoint} failed: {source}")]
pub struct MutationError {
    pub endpoint: String,
    pub source: TransportError,
}

/// Master error type for cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Shaping error: {0}")]
    Shaping(#[from] ShapingError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("Unknown endpoint: {name}")]
    UnknownEndpoint { name: String },

    #[error("Endpoint {name} is not a {expected} endpoint")]
    WrongEndpointKind { name: String, expected: &'static str },

    #[error("Invalid argument for {endpoint}: {reason}")]
    InvalidArgument { endpoint: String, reason: String },

    #[error("Query client was dropped while a request was in flight")]
    ClientDropped,
}

impl CacheError {
    /// Shorthand for argument validation failures inside request builders.
    pub fn invalid_argument(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display_status() {
        let err = TransportError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("503"));
        assert!(msg.contains("unavailable"));
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_transport_error_network_has_no_status() {
        let err = TransportError::Network {
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_mutation_error_display() {
        let err = MutationError {
            endpoint: "addReaction".to_string(),
            source: TransportError::Status {
                status: 500,
                body: "boom".to_string(),
            },
        };
        let msg = format!("{}", err);
        assert!(msg.contains("addReaction"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn test_cache_error_from_variants() {
        let transport = CacheError::from(TransportError::Network {
            reason: "down".to_string(),
        });
        assert!(matches!(transport, CacheError::Transport(_)));

        let shaping = CacheError::from(ShapingError::MissingId { index: 3 });
        assert!(matches!(shaping, CacheError::Shaping(_)));

        let mutation = CacheError::from(MutationError {
            endpoint: "deletePost".to_string(),
            source: TransportError::Decode {
                reason: "eof".to_string(),
            },
        });
        assert!(matches!(mutation, CacheError::Mutation(_)));
    }

    #[test]
    fn test_invalid_argument_helper() {
        let err = CacheError::invalid_argument("getPost", "id must be present");
        assert_eq!(
            err,
            CacheError::InvalidArgument {
                endpoint: "getPost".to_string(),
                reason: "id must be present".to_string(),
            }
        );
    }
}
