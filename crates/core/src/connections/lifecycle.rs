//! Connection lifecycle manager
//!
//! Owns the whole life of a [`PlatformConnection`]:
//! - authorization URL issuance (state + optional PKCE)
//! - code exchange and connection creation
//! - lazy and explicit token refresh, deduplicated per connection through a
//!   [`SingleFlight`] group and retried with exponential backoff
//! - revocation
//!
//! Tokens are encrypted with the injected [`TokenCipher`] before they reach
//! the repository and are never logged.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use orderlink_common::auth::{generate_state, PkcePair, CHALLENGE_METHOD};
use orderlink_common::crypto::TokenCipher;
use orderlink_common::resilience::{retry_with_backoff, BackoffPolicy};
use orderlink_common::sync::SingleFlight;
use orderlink_domain::constants::{
    AUTH_STATE_TTL_SECS, DEFAULT_TOKEN_LIFETIME_SECS, RETRY_BASE_DELAY_MS, RETRY_MAX_ATTEMPTS,
    TOKEN_REFRESH_SKEW_SECS,
};
use orderlink_domain::{
    AuthorizationRequest, AuthorizationState, CompletedAuthorization, ConnectionOwner,
    ConnectionStatus, LinkedSpreadsheet, OAuthPlatformConfig, OrderLinkError, PlatformConnection,
    PlatformData, PlatformType, Result, TokenResponse,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::ports::{AuthStateStore, ConnectionRepository, TokenEndpoint, TokenEndpointError};
use super::registry::PlatformRegistry;
use crate::sync::ports::AccessTokenProvider;

/// Timing knobs for the lifecycle manager.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    /// Attempts and base delay for token refresh.
    pub refresh_policy: BackoffPolicy,
    /// Refresh when the access token expires within this window.
    pub refresh_skew: Duration,
    /// Maximum age of an authorization state at exchange time.
    pub state_ttl: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            refresh_policy: BackoffPolicy::new(
                RETRY_MAX_ATTEMPTS,
                StdDuration::from_millis(RETRY_BASE_DELAY_MS),
            ),
            refresh_skew: Duration::seconds(TOKEN_REFRESH_SKEW_SECS),
            state_ttl: Duration::seconds(AUTH_STATE_TTL_SECS),
        }
    }
}

fn expiry_from(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    now + Duration::seconds(expires_in.filter(|secs| *secs > 0).unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
}

fn not_found(connection_id: &str) -> OrderLinkError {
    OrderLinkError::NotFound(format!("connection {connection_id}"))
}

fn revoked(connection_id: &str) -> OrderLinkError {
    OrderLinkError::Unauthorized(format!("connection {connection_id} has been revoked"))
}

/// The part of the manager that runs inside a refresh flight. Cheap to clone
/// so each flight owns its handles.
#[derive(Clone)]
struct TokenRefresher {
    repository: Arc<dyn ConnectionRepository>,
    token_endpoint: Arc<dyn TokenEndpoint>,
    cipher: Arc<TokenCipher>,
    platforms: Arc<PlatformRegistry>,
    policy: BackoffPolicy,
    skew: Duration,
}

impl TokenRefresher {
    async fn load(&self, connection_id: &str) -> Result<PlatformConnection> {
        self.repository.find_by_id(connection_id).await?.ok_or_else(|| not_found(connection_id))
    }

    fn decrypt_access_token(&self, connection: &PlatformConnection) -> Result<Option<String>> {
        connection
            .encrypted_access_token
            .as_deref()
            .map(|sealed| self.cipher.decrypt(sealed).map_err(OrderLinkError::from))
            .transpose()
    }

    /// Refresh the connection's tokens. With `force == false` the freshness
    /// check is repeated first, so a caller that queued behind a finished
    /// refresh reuses its result.
    async fn refresh(self, connection_id: String, force: bool) -> Result<TokenResponse> {
        let connection = self.load(&connection_id).await?;
        if connection.status == ConnectionStatus::Revoked {
            return Err(revoked(&connection_id));
        }

        let now = Utc::now();
        if !force && !connection.needs_refresh(now, self.skew) {
            if let Some(access_token) = self.decrypt_access_token(&connection)? {
                debug!(connection_id = %connection_id, "Token already fresh, skipping refresh");
                return Ok(TokenResponse {
                    access_token,
                    refresh_token: None,
                    expires_in: connection
                        .token_expires_at
                        .map(|expires_at| (expires_at - now).num_seconds()),
                    scope: None,
                    token_type: Some("Bearer".to_string()),
                });
            }
        }

        let Some(sealed_refresh) = connection.encrypted_refresh_token.clone() else {
            return Err(self.expire(connection, "no refresh token available").await);
        };
        let refresh_token = self.cipher.decrypt(&sealed_refresh)?;
        let config = self.platforms.get(connection.platform)?.clone();

        let endpoint = Arc::clone(&self.token_endpoint);
        let outcome = retry_with_backoff(&self.policy, TokenEndpointError::is_retryable, |attempt| {
            let endpoint = Arc::clone(&endpoint);
            let config = config.clone();
            let refresh_token = refresh_token.clone();
            async move {
                debug!(attempt, "Requesting token refresh");
                endpoint.refresh(&config, &refresh_token).await
            }
        })
        .await;

        match outcome {
            Ok(tokens) if !tokens.access_token.is_empty() => {
                self.store_refreshed(connection, tokens).await
            }
            Ok(_) => Err(self.expire(connection, "token endpoint returned no access token").await),
            Err(err) => {
                let message = format!("token refresh failed: {err}");
                Err(self.expire(connection, &message).await)
            }
        }
    }

    /// Persist refreshed tokens. Only credential fields are written, and
    /// nothing at all once the connection has been revoked, so a revoke or a
    /// `platform_data` change made while the request was in flight survives.
    async fn store_refreshed(
        &self,
        mut connection: PlatformConnection,
        tokens: TokenResponse,
    ) -> Result<TokenResponse> {
        let now = Utc::now();
        connection.encrypted_access_token = Some(self.cipher.encrypt(&tokens.access_token)?);
        if let Some(rotated) = tokens.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            connection.encrypted_refresh_token = Some(self.cipher.encrypt(rotated)?);
        }
        connection.token_expires_at = Some(expiry_from(now, tokens.expires_in));
        if let Some(scopes) = tokens.granted_scopes() {
            connection.scopes = scopes;
        }
        connection.set_status(ConnectionStatus::Active)?;
        connection.clear_error();
        connection.updated_at = now;

        if !self.repository.update_credentials(&connection).await? {
            info!(connection_id = %connection.id, "Connection revoked during refresh, tokens discarded");
            return Err(revoked(&connection.id));
        }

        info!(
            connection_id = %connection.id,
            expires_at = ?connection.token_expires_at,
            "Access token refreshed"
        );
        Ok(tokens)
    }

    /// Move the connection to `Expired`, record why, and build the error
    /// returned to the caller. A connection revoked in the meantime stays
    /// revoked.
    async fn expire(&self, mut connection: PlatformConnection, message: &str) -> OrderLinkError {
        warn!(connection_id = %connection.id, error = message, "Connection expired");
        if connection.set_status(ConnectionStatus::Expired).is_ok() {
            connection.record_error(message, Utc::now());
            match self.repository.update_credentials(&connection).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(connection_id = %connection.id, "Connection already revoked, status kept");
                    return revoked(&connection.id);
                }
                Err(err) => {
                    warn!(connection_id = %connection.id, error = %err, "Failed to persist expired status");
                }
            }
        }
        OrderLinkError::Unauthorized(format!(
            "connection {} requires re-authorization: {message}",
            connection.id
        ))
    }
}

/// Authorization, refresh and revocation of platform connections.
pub struct ConnectionLifecycleManager {
    refresher: TokenRefresher,
    state_store: Arc<dyn AuthStateStore>,
    settings: LifecycleSettings,
    flights: SingleFlight<String, Result<TokenResponse>>,
}

impl ConnectionLifecycleManager {
    /// Manager with [`LifecycleSettings::default`] timing.
    pub fn new(
        repository: Arc<dyn ConnectionRepository>,
        state_store: Arc<dyn AuthStateStore>,
        token_endpoint: Arc<dyn TokenEndpoint>,
        cipher: Arc<TokenCipher>,
        platforms: PlatformRegistry,
    ) -> Self {
        let settings = LifecycleSettings::default();
        Self {
            refresher: TokenRefresher {
                repository,
                token_endpoint,
                cipher,
                platforms: Arc::new(platforms),
                policy: settings.refresh_policy,
                skew: settings.refresh_skew,
            },
            state_store,
            settings,
            flights: SingleFlight::new(),
        }
    }

    /// Replace the timing knobs.
    #[must_use]
    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.refresher.policy = settings.refresh_policy;
        self.refresher.skew = settings.refresh_skew;
        self.settings = settings;
        self
    }

    fn platform_config(&self, platform: PlatformType) -> Result<&OAuthPlatformConfig> {
        self.refresher.platforms.get(platform)
    }

    /// Issue an authorization URL for `platform` on behalf of `owner`.
    ///
    /// The state context (and the PKCE verifier, when enabled) is stored
    /// under the returned state token.
    #[instrument(skip(self, owner), fields(owner_id = %owner.owner_id))]
    pub async fn begin_authorization(
        &self,
        platform: PlatformType,
        owner: &ConnectionOwner,
    ) -> Result<AuthorizationRequest> {
        let config = self.platform_config(platform)?;
        let state = generate_state();
        let pkce = config.use_pkce.then(PkcePair::generate);

        self.state_store
            .put_state(
                &state,
                AuthorizationState {
                    owner_id: owner.owner_id.clone(),
                    organization_id: owner.organization_id.clone(),
                    platform,
                    issued_at: Utc::now(),
                },
            )
            .await?;
        if let Some(pkce) = &pkce {
            self.state_store.put_verifier(&state, pkce.verifier.clone()).await?;
        }

        let authorization_url = build_authorization_url(config, &state, pkce.as_ref())?;
        info!(%platform, pkce = pkce.is_some(), "Authorization started");
        Ok(AuthorizationRequest { authorization_url, state })
    }

    /// Validate the returned state and exchange the code for tokens.
    ///
    /// State and verifier are consumed up front, so they are gone whether
    /// the exchange succeeds or not.
    #[instrument(skip_all)]
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<CompletedAuthorization> {
        let context = self.state_store.take_state(state).await?;
        let verifier = self.state_store.take_verifier(state).await?;

        let Some(context) = context else {
            warn!("Unknown or expired authorization state");
            return Err(OrderLinkError::Unauthorized("invalid authorization state".into()));
        };
        if Utc::now() - context.issued_at >= self.settings.state_ttl {
            warn!(platform = %context.platform, "Authorization state expired");
            return Err(OrderLinkError::Unauthorized("authorization state expired".into()));
        }

        let config = self.platform_config(context.platform)?;
        if config.use_pkce && verifier.is_none() {
            return Err(OrderLinkError::Unauthorized("missing PKCE verifier".into()));
        }

        let tokens = self
            .refresher
            .token_endpoint
            .exchange_code(config, code, verifier.as_deref())
            .await
            .map_err(|err| {
                warn!(error = %err, "Authorization code exchange failed");
                OrderLinkError::from(err)
            })?;
        if tokens.access_token.is_empty() {
            return Err(OrderLinkError::Unauthorized(
                "token response did not include an access token".into(),
            ));
        }

        info!(platform = %context.platform, "Authorization completed");
        Ok(CompletedAuthorization { tokens, context })
    }

    /// Complete authorization and persist a new `Active` connection.
    #[instrument(skip_all)]
    pub async fn connect(&self, code: &str, state: &str) -> Result<PlatformConnection> {
        let CompletedAuthorization { tokens, context } =
            self.complete_authorization(code, state).await?;
        let config = self.platform_config(context.platform)?;
        let cipher = &self.refresher.cipher;
        let now = Utc::now();

        let connection = PlatformConnection {
            id: uuid::Uuid::new_v4().to_string(),
            platform: context.platform,
            status: ConnectionStatus::Active,
            encrypted_access_token: Some(cipher.encrypt(&tokens.access_token)?),
            encrypted_refresh_token: tokens
                .refresh_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| cipher.encrypt(t))
                .transpose()?,
            token_expires_at: Some(expiry_from(now, tokens.expires_in)),
            scopes: tokens.granted_scopes().unwrap_or_else(|| config.scopes.clone()),
            owner_id: context.owner_id,
            organization_id: context.organization_id,
            platform_data: PlatformData::empty_for(context.platform),
            last_error_at: None,
            last_error_message: None,
            sync_count: 0,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        self.refresher.repository.insert(&connection).await?;

        info!(
            connection_id = %connection.id,
            platform = %connection.platform,
            organization_id = %connection.organization_id,
            "Connection created"
        );
        Ok(connection)
    }

    async fn refresh_flight(&self, connection_id: &str, force: bool) -> Result<TokenResponse> {
        let refresher = self.refresher.clone();
        let key = connection_id.to_string();
        let flight_key = key.clone();
        self.flights
            .run(key, move || refresher.refresh(flight_key, force))
            .await
            .map_err(|err| OrderLinkError::Internal(format!("token refresh aborted: {err}")))?
    }

    /// Refresh the connection's tokens now.
    ///
    /// Joins a refresh already in flight for the same connection.
    #[instrument(skip(self))]
    pub async fn refresh_access_token(&self, connection_id: &str) -> Result<TokenResponse> {
        let connection = self.refresher.load(connection_id).await?;
        if connection.status == ConnectionStatus::Revoked {
            return Err(revoked(connection_id));
        }
        self.refresh_flight(connection_id, true).await
    }

    /// Plaintext access token, refreshed first when it expires within the
    /// refresh window or the connection is not active.
    #[instrument(skip(self))]
    pub async fn get_access_token(&self, connection_id: &str) -> Result<String> {
        let connection = self.refresher.load(connection_id).await?;
        if connection.status == ConnectionStatus::Revoked {
            return Err(revoked(connection_id));
        }
        if !connection.needs_refresh(Utc::now(), self.settings.refresh_skew) {
            if let Some(token) = self.refresher.decrypt_access_token(&connection)? {
                return Ok(token);
            }
        }
        let tokens = self.refresh_flight(connection_id, false).await?;
        Ok(tokens.access_token)
    }

    /// Revoke the connection: status `Revoked`, tokens dropped. Irreversible.
    ///
    /// The provider is asked to revoke the grant too, best effort.
    #[instrument(skip(self))]
    pub async fn revoke(&self, connection_id: &str) -> Result<PlatformConnection> {
        let mut connection = self.refresher.load(connection_id).await?;
        if connection.status == ConnectionStatus::Revoked {
            return Ok(connection);
        }

        self.revoke_remote(&connection).await;
        if let Some(latest) = self.refresher.repository.find_by_id(connection_id).await? {
            connection = latest;
        }

        let now = Utc::now();
        connection.set_status(ConnectionStatus::Revoked)?;
        connection.encrypted_access_token = None;
        connection.encrypted_refresh_token = None;
        connection.token_expires_at = None;
        connection.record_error("connection revoked by user", now);
        self.refresher.repository.update(&connection).await?;

        info!(connection_id = %connection.id, "Connection revoked");
        Ok(connection)
    }

    async fn revoke_remote(&self, connection: &PlatformConnection) {
        let Ok(config) = self.platform_config(connection.platform) else {
            return;
        };
        if config.revoke_url.is_none() {
            return;
        }
        let sealed = connection
            .encrypted_refresh_token
            .as_deref()
            .or(connection.encrypted_access_token.as_deref());
        let Some(sealed) = sealed else {
            return;
        };
        match self.refresher.cipher.decrypt(sealed) {
            Ok(token) => {
                if let Err(err) = self.refresher.token_endpoint.revoke(config, &token).await {
                    warn!(connection_id = %connection.id, error = %err, "Provider-side revoke failed");
                }
            }
            Err(err) => {
                warn!(connection_id = %connection.id, error = %err, "Could not decrypt token for revoke");
            }
        }
    }

    /// Load one connection, `NotFound` when it does not exist.
    pub async fn get_connection(&self, connection_id: &str) -> Result<PlatformConnection> {
        self.refresher.load(connection_id).await
    }

    /// Every connection of an organization.
    pub async fn list_connections(&self, organization_id: &str) -> Result<Vec<PlatformConnection>> {
        self.refresher.repository.list_by_organization(organization_id).await
    }

    /// Attach (or replace) a spreadsheet on a Google Sheets connection.
    #[instrument(skip(self, linked), fields(spreadsheet_id = %linked.spreadsheet_id))]
    pub async fn link_spreadsheet(
        &self,
        connection_id: &str,
        linked: LinkedSpreadsheet,
    ) -> Result<PlatformConnection> {
        let mut connection = self.refresher.load(connection_id).await?;
        let data = connection.platform_data.google_sheets_mut().ok_or_else(|| {
            OrderLinkError::InvalidInput(format!(
                "connection {connection_id} is not a Google Sheets connection"
            ))
        })?;
        data.spreadsheets.retain(|existing| existing.spreadsheet_id != linked.spreadsheet_id);
        data.spreadsheets.push(linked);
        connection.updated_at = Utc::now();
        self.refresher.repository.update(&connection).await?;
        Ok(connection)
    }

    /// Number of refreshes currently in flight.
    #[must_use]
    pub fn refreshes_in_flight(&self) -> usize {
        self.flights.in_flight()
    }
}

#[async_trait]
impl AccessTokenProvider for ConnectionLifecycleManager {
    async fn access_token(&self, connection_id: &str) -> Result<String> {
        self.get_access_token(connection_id).await
    }
}

/// Authorize URL with `response_type=code`, client, redirect, space-joined
/// scopes, state, `prompt=consent`, `access_type=offline`, platform extras
/// and the PKCE challenge.
fn build_authorization_url(
    config: &OAuthPlatformConfig,
    state: &str,
    pkce: Option<&PkcePair>,
) -> Result<String> {
    let mut params: Vec<(String, String)> = vec![
        ("response_type".into(), "code".into()),
        ("client_id".into(), config.client_id.clone()),
        ("redirect_uri".into(), config.redirect_uri.clone()),
        ("scope".into(), config.scopes.join(" ")),
        ("state".into(), state.to_string()),
        ("prompt".into(), "consent".into()),
        ("access_type".into(), "offline".into()),
    ];
    for (key, value) in &config.extra_auth_params {
        if !params.iter().any(|(existing, _)| existing == key) {
            params.push((key.clone(), value.clone()));
        }
    }
    if let Some(pkce) = pkce {
        params.push(("code_challenge".into(), pkce.challenge.clone()));
        params.push(("code_challenge_method".into(), CHALLENGE_METHOD.into()));
    }

    Url::parse_with_params(&config.auth_url, &params)
        .map(String::from)
        .map_err(|e| OrderLinkError::Config(format!("invalid authorization URL: {e}")))
}
