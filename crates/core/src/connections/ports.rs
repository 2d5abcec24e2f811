//! Port interfaces for connection storage and OAuth token endpoints

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderlink_domain::{
    AuthorizationState, OAuthPlatformConfig, OrderLinkError, PlatformConnection, PlatformType,
    Result, TokenResponse,
};
use thiserror::Error;

/// Persistence for [`PlatformConnection`] records.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Insert a new connection.
    async fn insert(&self, connection: &PlatformConnection) -> Result<()>;

    /// Overwrite an existing connection.
    async fn update(&self, connection: &PlatformConnection) -> Result<()>;

    /// Write only the credential fields (status, tokens, expiry, scopes,
    /// last error, `updated_at`) unless the stored record is revoked.
    ///
    /// Returns `false` when the stored record is revoked and nothing was
    /// written; `NotFound` when it does not exist.
    async fn update_credentials(&self, connection: &PlatformConnection) -> Result<bool>;

    /// Look up one connection.
    async fn find_by_id(&self, id: &str) -> Result<Option<PlatformConnection>>;

    /// Every connection of an organization, oldest first.
    async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<PlatformConnection>>;

    /// Active connections of one platform, across organizations.
    async fn list_active(&self, platform: PlatformType) -> Result<Vec<PlatformConnection>>;

    /// Increment `sync_count` and stamp `last_sync_at`.
    async fn record_sync(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Short-lived storage for OAuth state and PKCE verifiers, keyed by the
/// state token. Entries expire on their own after the authorization window.
#[async_trait]
pub trait AuthStateStore: Send + Sync {
    /// Store the context issued with `state`.
    async fn put_state(&self, state: &str, context: AuthorizationState) -> Result<()>;

    /// Remove and return the context stored for `state`.
    async fn take_state(&self, state: &str) -> Result<Option<AuthorizationState>>;

    /// Store the PKCE verifier issued with `state`.
    async fn put_verifier(&self, state: &str, verifier: String) -> Result<()>;

    /// Remove and return the verifier stored for `state`.
    async fn take_verifier(&self, state: &str) -> Result<Option<String>>;
}

/// Failure talking to a platform's token endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenEndpointError {
    /// No response from the endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("token endpoint timed out")]
    Timeout,

    /// Non-success status with the OAuth `error` code.
    #[error("token endpoint returned {status}: {error}")]
    Http { status: u16, error: String, description: Option<String> },

    /// Success status but an unusable body.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl TokenEndpointError {
    /// Network failures, timeouts, 5xx and 429 are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse(_) => false,
        }
    }
}

impl From<TokenEndpointError> for OrderLinkError {
    fn from(err: TokenEndpointError) -> Self {
        match &err {
            TokenEndpointError::Network(_) | TokenEndpointError::Timeout => {
                Self::Network(err.to_string())
            }
            TokenEndpointError::Http { status: 429, .. } => Self::RateLimited(err.to_string()),
            TokenEndpointError::Http { status, .. } if *status >= 500 => {
                Self::Network(err.to_string())
            }
            TokenEndpointError::Http { .. } | TokenEndpointError::InvalidResponse(_) => {
                Self::Unauthorized(err.to_string())
            }
        }
    }
}

/// OAuth 2.0 token endpoint client.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// `grant_type=authorization_code`, with `code_verifier` when PKCE is on.
    async fn exchange_code(
        &self,
        config: &OAuthPlatformConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> std::result::Result<TokenResponse, TokenEndpointError>;

    /// `grant_type=refresh_token`.
    async fn refresh(
        &self,
        config: &OAuthPlatformConfig,
        refresh_token: &str,
    ) -> std::result::Result<TokenResponse, TokenEndpointError>;

    /// Revoke a token at the provider, when it supports it.
    async fn revoke(
        &self,
        config: &OAuthPlatformConfig,
        token: &str,
    ) -> std::result::Result<(), TokenEndpointError>;
}
