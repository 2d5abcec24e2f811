//! In-memory connection storage, auth state store and token endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderlink_core::connections::ports::{
    AuthStateStore, ConnectionRepository, TokenEndpoint, TokenEndpointError,
};
use orderlink_core::sync::ports::AccessTokenProvider;
use orderlink_domain::{
    AuthorizationState, ConnectionStatus, OAuthPlatformConfig, OrderLinkError, PlatformConnection,
    PlatformType, Result as DomainResult, TokenResponse,
};
use parking_lot::Mutex;

/// `ConnectionRepository` over a `HashMap`.
#[derive(Default, Clone)]
pub struct InMemoryConnections {
    rows: Arc<Mutex<HashMap<String, PlatformConnection>>>,
}

impl InMemoryConnections {
    pub fn with(connection: PlatformConnection) -> Self {
        let repo = Self::default();
        repo.rows.lock().insert(connection.id.clone(), connection);
        repo
    }

    pub fn get(&self, id: &str) -> PlatformConnection {
        self.rows.lock().get(id).cloned().expect("connection exists")
    }

    pub fn put(&self, connection: PlatformConnection) {
        self.rows.lock().insert(connection.id.clone(), connection);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnections {
    async fn insert(&self, connection: &PlatformConnection) -> DomainResult<()> {
        self.rows.lock().insert(connection.id.clone(), connection.clone());
        Ok(())
    }

    async fn update(&self, connection: &PlatformConnection) -> DomainResult<()> {
        let mut rows = self.rows.lock();
        if !rows.contains_key(&connection.id) {
            return Err(OrderLinkError::NotFound(connection.id.clone()));
        }
        rows.insert(connection.id.clone(), connection.clone());
        Ok(())
    }

    async fn update_credentials(&self, connection: &PlatformConnection) -> DomainResult<bool> {
        let mut rows = self.rows.lock();
        let Some(stored) = rows.get_mut(&connection.id) else {
            return Err(OrderLinkError::NotFound(connection.id.clone()));
        };
        if stored.status == ConnectionStatus::Revoked {
            return Ok(false);
        }
        stored.status = connection.status;
        stored.encrypted_access_token = connection.encrypted_access_token.clone();
        stored.encrypted_refresh_token = connection.encrypted_refresh_token.clone();
        stored.token_expires_at = connection.token_expires_at;
        stored.scopes = connection.scopes.clone();
        stored.last_error_at = connection.last_error_at;
        stored.last_error_message = connection.last_error_message.clone();
        stored.updated_at = connection.updated_at;
        Ok(true)
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<PlatformConnection>> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn list_by_organization(&self, organization_id: &str) -> DomainResult<Vec<PlatformConnection>> {
        Ok(self.rows.lock().values().filter(|c| c.organization_id == organization_id).cloned().collect())
    }

    async fn list_active(&self, platform: PlatformType) -> DomainResult<Vec<PlatformConnection>> {
        Ok(self.rows.lock().values().filter(|c| c.platform == platform && c.is_active()).cloned().collect())
    }

    async fn record_sync(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(connection) = self.rows.lock().get_mut(id) {
            connection.sync_count += 1;
            connection.last_sync_at = Some(at);
        }
        Ok(())
    }
}

/// `AuthStateStore` without expiry; tests backdate entries directly.
#[derive(Default, Clone)]
pub struct InMemoryAuthStates {
    states: Arc<Mutex<HashMap<String, AuthorizationState>>>,
    verifiers: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryAuthStates {
    pub fn backdate(&self, state: &str, by: chrono::Duration) {
        if let Some(context) = self.states.lock().get_mut(state) {
            context.issued_at = context.issued_at - by;
        }
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.lock().contains_key(state)
    }

    pub fn has_verifier(&self, state: &str) -> bool {
        self.verifiers.lock().contains_key(state)
    }
}

#[async_trait]
impl AuthStateStore for InMemoryAuthStates {
    async fn put_state(&self, state: &str, context: AuthorizationState) -> DomainResult<()> {
        self.states.lock().insert(state.to_string(), context);
        Ok(())
    }

    async fn take_state(&self, state: &str) -> DomainResult<Option<AuthorizationState>> {
        Ok(self.states.lock().remove(state))
    }

    async fn put_verifier(&self, state: &str, verifier: String) -> DomainResult<()> {
        self.verifiers.lock().insert(state.to_string(), verifier);
        Ok(())
    }

    async fn take_verifier(&self, state: &str) -> DomainResult<Option<String>> {
        Ok(self.verifiers.lock().remove(state))
    }
}

type Scripted = std::result::Result<TokenResponse, TokenEndpointError>;

/// Token endpoint replaying scripted refresh responses; once the script
/// runs out every refresh succeeds with a fresh token.
#[derive(Default, Clone)]
pub struct ScriptedTokenEndpoint {
    refreshes: Arc<Mutex<VecDeque<Scripted>>>,
    exchange: Arc<Mutex<Option<Scripted>>>,
    refresh_calls: Arc<AtomicUsize>,
    revoke_calls: Arc<AtomicUsize>,
    last_verifier: Arc<Mutex<Option<String>>>,
    delay: Option<Duration>,
}

impl ScriptedTokenEndpoint {
    pub fn with_refreshes(responses: Vec<Scripted>) -> Self {
        Self { refreshes: Arc::new(Mutex::new(responses.into())), ..Self::default() }
    }

    /// Slow every refresh down so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_exchange(&self, response: Scripted) {
        *self.exchange.lock() = Some(response);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn last_verifier(&self) -> Option<String> {
        self.last_verifier.lock().clone()
    }
}

pub fn tokens(access: &str, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in: Some(3600),
        scope: None,
        token_type: Some("Bearer".into()),
    }
}

pub fn http_error(status: u16, error: &str) -> TokenEndpointError {
    TokenEndpointError::Http { status, error: error.to_string(), description: None }
}

#[async_trait]
impl TokenEndpoint for ScriptedTokenEndpoint {
    async fn exchange_code(
        &self,
        _config: &OAuthPlatformConfig,
        _code: &str,
        code_verifier: Option<&str>,
    ) -> std::result::Result<TokenResponse, TokenEndpointError> {
        *self.last_verifier.lock() = code_verifier.map(str::to_string);
        self.exchange.lock().clone().unwrap_or_else(|| Ok(tokens("access-new", Some("refresh-new"))))
    }

    async fn refresh(
        &self,
        _config: &OAuthPlatformConfig,
        _refresh_token: &str,
    ) -> std::result::Result<TokenResponse, TokenEndpointError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.refreshes.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(tokens(&format!("access-{call}"), None)))
    }

    async fn revoke(
        &self,
        _config: &OAuthPlatformConfig,
        _token: &str,
    ) -> std::result::Result<(), TokenEndpointError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the same token for every connection.
pub struct StaticTokens(pub &'static str);

#[async_trait]
impl AccessTokenProvider for StaticTokens {
    async fn access_token(&self, _connection_id: &str) -> DomainResult<String> {
        Ok(self.0.to_string())
    }
}
