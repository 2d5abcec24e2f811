//! Common error type shared by the primitives in this crate.
//!
//! Higher layers wrap [`CommonError`] into their own error enums; the domain
//! crate maps it onto `OrderLinkError` variants.

use std::time::Duration;

use thiserror::Error;

/// Standard result type using [`CommonError`].
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised by the shared primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommonError {
    /// Encryption, decryption or key handling failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A configuration value is missing or malformed.
    #[error("Configuration error in field '{field}': {message}")]
    Config { field: String, message: String },

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An operation exceeded its deadline.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// A remote service reported a failure.
    #[error("Backend error from '{service}': {message}")]
    Backend { service: String, message: String, is_retryable: bool },

    /// Invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommonError {
    /// Build a crypto error.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Build a configuration error for a named field.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { field: field.into(), message: message.into() }
    }

    /// Build a backend error.
    pub fn backend(service: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend { service: service.into(), message: message.into(), is_retryable: retryable }
    }

    /// Build an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the failed operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Backend { is_retryable, .. } => *is_retryable,
            Self::Crypto(_) | Self::Config { .. } | Self::Serialization(_) | Self::Internal(_) => {
                false
            }
        }
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
