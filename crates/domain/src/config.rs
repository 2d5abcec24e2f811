//! Configuration structures
//!
//! Loaded by `orderlink_infra::config::load()` from environment variables or
//! a TOML/JSON file. Every section has serde defaults so partial files work.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY, DEFAULT_POLLING_INTERVAL_SECS,
    DEFAULT_PRODUCT_STOCK, INTER_BATCH_DELAY_MS, RETRY_BASE_DELAY_MS, RETRY_MAX_ATTEMPTS,
};
use crate::errors::{OrderLinkError, Result};
use crate::types::{PlatformType, SheetField, SyncOptions};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite location and pool.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token encryption key.
    #[serde(default)]
    pub security: SecurityConfig,
    /// OAuth client settings per platform.
    #[serde(default)]
    pub oauth: BTreeMap<PlatformType, OAuthPlatformConfig>,
    /// Batch, retry and polling settings.
    #[serde(default)]
    pub sync: SyncSettings,
    /// Row validation rules.
    #[serde(default)]
    pub validation: ValidationRules,
    /// Log level and format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(OrderLinkError::Config("database.path must not be empty".into()));
        }
        if self.database.pool_size == 0 {
            return Err(OrderLinkError::Config("database.pool_size must be at least 1".into()));
        }
        self.security.validate()?;
        self.sync.validate()?;
        for (platform, oauth) in &self.oauth {
            if oauth.platform != *platform {
                return Err(OrderLinkError::Config(format!(
                    "oauth.{platform} is configured for {}",
                    oauth.platform
                )));
            }
            oauth.validate()?;
        }
        if self.validation.phone_pattern.trim().is_empty() {
            return Err(OrderLinkError::Config("validation.phone_pattern must not be empty".into()));
        }
        Ok(())
    }
}

fn default_db_path() -> String {
    "orderlink.db".to_string()
}

const fn default_pool_size() -> u32 {
    8
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// SQLite database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// How long a writer waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Token-at-rest key material.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 64 hex characters (32 bytes).
    #[serde(default)]
    pub token_key: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig").field("token_key", &"[REDACTED]").finish()
    }
}

impl SecurityConfig {
    fn validate(&self) -> Result<()> {
        let key = self.token_key.trim();
        if key.len() != 64 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(OrderLinkError::Config(
                "security.token_key must be 64 hex characters".into(),
            ));
        }
        Ok(())
    }
}

/// OAuth client registration for one platform.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthPlatformConfig {
    /// Platform these settings belong to.
    pub platform: PlatformType,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret; never logged.
    #[serde(default)]
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Revocation endpoint, when the provider has one.
    #[serde(default)]
    pub revoke_url: Option<String>,
    /// Registered callback URL.
    pub redirect_uri: String,
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Send an S256 PKCE challenge.
    #[serde(default)]
    pub use_pkce: bool,
    /// Additional authorize-URL parameters; `prompt` and `access_type` are
    /// always sent.
    #[serde(default)]
    pub extra_auth_params: BTreeMap<String, String>,
}

impl std::fmt::Debug for OAuthPlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthPlatformConfig")
            .field("platform", &self.platform)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("use_pkce", &self.use_pkce)
            .finish_non_exhaustive()
    }
}

impl OAuthPlatformConfig {
    /// Google OAuth endpoints with the Sheets and Drive read scopes.
    #[must_use]
    pub fn google_sheets(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        let mut extra_auth_params = BTreeMap::new();
        extra_auth_params.insert("include_granted_scopes".to_string(), "true".to_string());
        Self {
            platform: PlatformType::GoogleSheets,
            client_id,
            client_secret,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            revoke_url: Some("https://oauth2.googleapis.com/revoke".to_string()),
            redirect_uri,
            scopes: vec![
                "https://www.googleapis.com/auth/spreadsheets".to_string(),
                "https://www.googleapis.com/auth/drive.readonly".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
            ],
            use_pkce: true,
            extra_auth_params,
        }
    }

    fn validate(&self) -> Result<()> {
        let platform = self.platform;
        if self.client_id.trim().is_empty() {
            return Err(OrderLinkError::Config(format!("oauth.{platform}.client_id is empty")));
        }
        if self.auth_url.trim().is_empty() || self.token_url.trim().is_empty() {
            return Err(OrderLinkError::Config(format!("oauth.{platform} endpoints are empty")));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(OrderLinkError::Config(format!("oauth.{platform}.redirect_uri is empty")));
        }
        Ok(())
    }
}

/// Batch sync tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Rows per batch.
    pub batch_size: usize,
    /// Rows processed at once within a batch.
    pub max_concurrency: usize,
    /// Pause between batches.
    pub inter_batch_delay_ms: u64,
    /// Attempts for sheet reads and feedback writes.
    pub retry_max_attempts: u32,
    /// Base backoff for sheet reads and feedback writes.
    pub retry_base_delay_ms: u64,
    /// Run the polling scheduler.
    pub polling_enabled: bool,
    /// Polling tick interval.
    pub polling_interval_secs: u64,
    /// Write references, statuses and highlights back to the sheet.
    pub feedback_enabled: bool,
    /// Stock level for products created from sheet rows.
    pub default_product_stock: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            inter_batch_delay_ms: INTER_BATCH_DELAY_MS,
            retry_max_attempts: RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            polling_enabled: false,
            polling_interval_secs: DEFAULT_POLLING_INTERVAL_SECS,
            feedback_enabled: true,
            default_product_stock: DEFAULT_PRODUCT_STOCK,
        }
    }
}

impl SyncSettings {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(OrderLinkError::Config("sync.batch_size must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(OrderLinkError::Config("sync.max_concurrency must be at least 1".into()));
        }
        if self.retry_max_attempts == 0 {
            return Err(OrderLinkError::Config("sync.retry_max_attempts must be at least 1".into()));
        }
        if self.polling_enabled && self.polling_interval_secs == 0 {
            return Err(OrderLinkError::Config("sync.polling_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Default run options derived from these settings.
    #[must_use]
    pub fn default_options(&self) -> SyncOptions {
        SyncOptions {
            batch_size: self.batch_size,
            max_concurrency: self.max_concurrency,
            ..SyncOptions::default()
        }
    }
}

/// Default accepts local or international numbers: optional `+` then 9-15
/// digits, once spaces, dots, dashes and parentheses are stripped.
pub const DEFAULT_PHONE_PATTERN: &str = r"^\+?[0-9]{9,15}$";

fn default_phone_pattern() -> String {
    DEFAULT_PHONE_PATTERN.to_string()
}

fn default_required_fields() -> Vec<SheetField> {
    vec![
        SheetField::Phone,
        SheetField::ProductName,
        SheetField::Price,
        SheetField::Address,
        SheetField::City,
        SheetField::CustomerName,
    ]
}

/// Row validation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Regex a normalized phone must match.
    #[serde(default = "default_phone_pattern")]
    pub phone_pattern: String,
    /// Fields that must be non-blank.
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<SheetField>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self { phone_pattern: default_phone_pattern(), required_fields: default_required_fields() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.security.token_key = "ab".repeat(32);
        config.oauth.insert(
            PlatformType::GoogleSheets,
            OAuthPlatformConfig::google_sheets(
                "client".into(),
                "secret".into(),
                "http://localhost/callback".into(),
            ),
        );
        config
    }

    #[test]
    fn defaults_validate_once_key_is_set() {
        assert!(valid().validate().is_ok());
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn rejects_zero_batch_and_concurrency() {
        let mut config = valid();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
        let mut config = valid();
        config.sync.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_incomplete_oauth_client() {
        let mut config = valid();
        if let Some(google) = config.oauth.get_mut(&PlatformType::GoogleSheets) {
            google.client_id.clear();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [database]
            path = "/tmp/orders.db"

            [sync]
            batch_size = 25

            [oauth.google_sheets]
            platform = "google_sheets"
            client_id = "id"
            client_secret = "secret"
            auth_url = "https://accounts.google.com/o/oauth2/v2/auth"
            token_url = "https://oauth2.googleapis.com/token"
            redirect_uri = "http://localhost/cb"
            use_pkce = true
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, "/tmp/orders.db");
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.sync.max_concurrency, 3);
        assert!(config.oauth[&PlatformType::GoogleSheets].use_pkce);
        assert_eq!(config.validation.required_fields.len(), 6);
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = valid();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(&"ab".repeat(32)));
        assert!(!rendered.contains("\"secret\""));
    }
}
