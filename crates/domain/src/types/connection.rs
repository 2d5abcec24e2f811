//! External platform connections and OAuth artefacts

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{OrderLinkError, Result};
use crate::types::sheet::SheetConfig;

/// Platforms a connection can link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformType {
    /// Google Sheets via Google OAuth.
    GoogleSheets,
    /// Shopify store.
    Shopify,
    /// YouCan store.
    #[serde(rename = "youcan")]
    YouCan,
}

crate::impl_domain_status_conversions!(PlatformType {
    GoogleSheets => "google_sheets",
    Shopify => "shopify",
    YouCan => "youcan",
});

/// Connection lifecycle status.
///
/// `Active -> Expired` on unrecoverable refresh failure, `Expired -> Active`
/// on a later successful refresh, `Active | Expired -> Revoked` only on
/// explicit request. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Tokens usable or refreshable.
    Active,
    /// Refresh failed; re-authorization or a later refresh needed.
    Expired,
    /// Disconnected by the user. Terminal.
    Revoked,
}

crate::impl_domain_status_conversions!(ConnectionStatus {
    Active => "active",
    Expired => "expired",
    Revoked => "revoked",
});

/// Who a connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOwner {
    /// User who authorized the connection.
    pub owner_id: String,
    /// Organization the connection belongs to.
    pub organization_id: String,
}

/// Push-notification channel registered on a spreadsheet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookChannel {
    /// Channel id we chose at registration.
    pub channel_id: String,
    /// Provider id of the watched resource; needed to stop the channel.
    pub resource_id: Option<String>,
    /// Shared secret echoed back by the provider on every notification.
    pub token: Option<String>,
    /// When the provider stops sending notifications.
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for WebhookChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("channel_id", &self.channel_id)
            .field("resource_id", &self.resource_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl WebhookChannel {
    /// Whether the channel has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp <= now)
    }
}

/// A spreadsheet linked to a Google Sheets connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedSpreadsheet {
    /// Provider spreadsheet id.
    pub spreadsheet_id: String,
    /// Tab and column mapping.
    pub sheet: SheetConfig,
    /// Active change-notification channel.
    #[serde(default)]
    pub webhook_channel: Option<WebhookChannel>,
}

/// Google Sheets specific connection metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleSheetsData {
    /// Google account that authorized.
    #[serde(default)]
    pub account_email: Option<String>,
    /// Linked spreadsheets.
    #[serde(default)]
    pub spreadsheets: Vec<LinkedSpreadsheet>,
}

/// Shopify specific connection metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopifyData {
    /// `*.myshopify.com` domain.
    #[serde(default)]
    pub shop_domain: Option<String>,
}

/// YouCan specific connection metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YouCanData {
    /// Store identifier.
    #[serde(default)]
    pub store_slug: Option<String>,
}

/// Typed per-platform metadata, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformData {
    /// Google Sheets metadata.
    GoogleSheets(GoogleSheetsData),
    /// Shopify metadata.
    Shopify(ShopifyData),
    /// YouCan metadata.
    #[serde(rename = "youcan")]
    YouCan(YouCanData),
}

impl PlatformData {
    /// Empty metadata of the right variant for `platform`.
    #[must_use]
    pub fn empty_for(platform: PlatformType) -> Self {
        match platform {
            PlatformType::GoogleSheets => Self::GoogleSheets(GoogleSheetsData::default()),
            PlatformType::Shopify => Self::Shopify(ShopifyData::default()),
            PlatformType::YouCan => Self::YouCan(YouCanData::default()),
        }
    }

    /// Platform the metadata belongs to.
    #[must_use]
    pub fn platform(&self) -> PlatformType {
        match self {
            Self::GoogleSheets(_) => PlatformType::GoogleSheets,
            Self::Shopify(_) => PlatformType::Shopify,
            Self::YouCan(_) => PlatformType::YouCan,
        }
    }

    /// Google Sheets metadata, if this is that variant.
    #[must_use]
    pub fn google_sheets(&self) -> Option<&GoogleSheetsData> {
        match self {
            Self::GoogleSheets(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable Google Sheets metadata, if this is that variant.
    pub fn google_sheets_mut(&mut self) -> Option<&mut GoogleSheetsData> {
        match self {
            Self::GoogleSheets(data) => Some(data),
            _ => None,
        }
    }
}

/// One external account link.
///
/// Tokens are only ever held in their encrypted envelope form.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConnection {
    /// Connection id.
    pub id: String,
    /// Linked platform.
    pub platform: PlatformType,
    /// Lifecycle status.
    pub status: ConnectionStatus,
    /// Encrypted access token envelope.
    pub encrypted_access_token: Option<String>,
    /// Encrypted refresh token envelope.
    pub encrypted_refresh_token: Option<String>,
    /// Access token expiry.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// User who authorized the connection.
    pub owner_id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Per-platform metadata.
    pub platform_data: PlatformData,
    /// When the last failure happened.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Last failure, cleared on success.
    pub last_error_message: Option<String>,
    /// Completed syncs.
    pub sync_count: i64,
    /// Last completed sync.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for PlatformConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConnection")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field("status", &self.status)
            .field("encrypted_access_token", &self.encrypted_access_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "encrypted_refresh_token",
                &self.encrypted_refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_expires_at", &self.token_expires_at)
            .field("scopes", &self.scopes)
            .field("owner_id", &self.owner_id)
            .field("organization_id", &self.organization_id)
            .field("last_error_message", &self.last_error_message)
            .field("sync_count", &self.sync_count)
            .finish_non_exhaustive()
    }
}

impl PlatformConnection {
    /// Status is `Active`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }

    /// Whether the access token must be refreshed before use: the connection
    /// is not active, there is no token, or it expires within `skew`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        if !self.is_active() || self.encrypted_access_token.is_none() {
            return true;
        }
        self.token_expires_at.is_some_and(|expires_at| expires_at - skew <= now)
    }

    /// Apply a status transition, rejecting moves out of `Revoked`.
    pub fn set_status(&mut self, next: ConnectionStatus) -> Result<()> {
        if self.status == ConnectionStatus::Revoked && next != ConnectionStatus::Revoked {
            return Err(OrderLinkError::InvalidState(format!(
                "connection {} is revoked and cannot become {next}",
                self.id
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Record a failure on the connection.
    pub fn record_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.last_error_at = Some(now);
        self.last_error_message = Some(message.into());
        self.updated_at = now;
    }

    /// Forget the last failure.
    pub fn clear_error(&mut self) {
        self.last_error_at = None;
        self.last_error_message = None;
    }

    /// Linked spreadsheet by id (Google Sheets connections only).
    #[must_use]
    pub fn linked_spreadsheet(&self, spreadsheet_id: &str) -> Option<&LinkedSpreadsheet> {
        self.platform_data
            .google_sheets()?
            .spreadsheets
            .iter()
            .find(|linked| linked.spreadsheet_id == spreadsheet_id)
    }

    /// Linked spreadsheet whose webhook channel has the given id.
    #[must_use]
    pub fn spreadsheet_for_channel(&self, channel_id: &str) -> Option<&LinkedSpreadsheet> {
        self.platform_data.google_sheets()?.spreadsheets.iter().find(|linked| {
            linked.webhook_channel.as_ref().is_some_and(|channel| channel.channel_id == channel_id)
        })
    }
}

/// Token endpoint response for both code exchange and refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token; empty when the provider omitted it.
    #[serde(default)]
    pub access_token: String,
    /// Refresh token; providers often omit it on refresh.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl TokenResponse {
    /// Granted scopes from the space-separated `scope` field.
    #[must_use]
    pub fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|scopes| !scopes.is_empty())
    }
}

/// Context persisted under the CSRF state key while the user authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    /// User starting the flow.
    pub owner_id: String,
    /// Organization the connection will belong to.
    pub organization_id: String,
    /// Platform being authorized.
    pub platform: PlatformType,
    /// When the state was issued.
    pub issued_at: DateTime<Utc>,
}

/// Authorization URL handed to the user agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Provider consent URL.
    pub authorization_url: String,
    /// CSRF state embedded in the URL.
    pub state: String,
}

/// Successful code exchange plus the context it was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAuthorization {
    /// Tokens returned by the provider.
    pub tokens: TokenResponse,
    /// Context stored when the flow started.
    pub context: AuthorizationState,
}
