//! Error types used throughout the engine

use orderlink_common::error::CommonError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for OrderLink
///
/// `Clone` so a single failed token refresh can be handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum OrderLinkError {
    /// Storage failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure or provider 5xx; retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials rejected or unusable.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Encryption, state or signature check failed.
    #[error("Security error: {0}")]
    Security(String),

    /// Record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied bad data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Provider throttled the request; retryable.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Unexpected failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrderLinkError {
    /// Transient failures worth retrying later ("try again later" at the API
    /// boundary).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_))
    }

    /// Connection-level authorization failure, distinct from row errors.
    #[must_use]
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<CommonError> for OrderLinkError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Crypto(_) => Self::Security(err.to_string()),
            CommonError::Config { .. } => Self::Config(err.to_string()),
            CommonError::Serialization(_) => Self::InvalidInput(err.to_string()),
            CommonError::Timeout { .. } | CommonError::Backend { .. } => {
                Self::Network(err.to_string())
            }
            CommonError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Result type alias for OrderLink operations
pub type Result<T> = std::result::Result<T, OrderLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&OrderLinkError::Unauthorized("state expired".into()))
            .expect("serialize");
        assert_eq!(json, r#"{"type":"Unauthorized","message":"state expired"}"#);
    }

    #[test]
    fn classification_helpers() {
        assert!(OrderLinkError::RateLimited("429".into()).is_retryable());
        assert!(OrderLinkError::Network("reset".into()).is_retryable());
        assert!(!OrderLinkError::Unauthorized("x".into()).is_retryable());
        assert!(OrderLinkError::Unauthorized("x".into()).is_authorization());
        assert!(!OrderLinkError::NotFound("x".into()).is_authorization());
    }

    #[test]
    fn common_errors_map_to_domain_variants() {
        let err: OrderLinkError = CommonError::crypto("bad tag").into();
        assert!(matches!(err, OrderLinkError::Security(_)));
        let err: OrderLinkError = CommonError::config("token_key", "short").into();
        assert!(matches!(err, OrderLinkError::Config(_)));
    }
}
