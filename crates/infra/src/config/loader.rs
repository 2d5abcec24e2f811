//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Read `.env` from the working directory into the environment, if present
//! 2. Attempt to load from environment variables
//! 3. If a required variable is missing, fall back to a config file
//! 4. Validate the result
//!
//! ## Environment Variables
//! Required:
//! - `ORDERLINK_DB_PATH`: Database file path
//! - `ORDERLINK_TOKEN_KEY`: Token encryption key, 64 hex characters
//!
//! Optional:
//! - `ORDERLINK_DB_POOL_SIZE`: Connection pool size
//! - `ORDERLINK_SYNC_BATCH_SIZE`: Rows per batch
//! - `ORDERLINK_SYNC_MAX_CONCURRENCY`: Rows in flight per batch
//! - `ORDERLINK_POLLING_INTERVAL`: Polling interval in seconds
//! - `ORDERLINK_POLLING_ENABLED`: Whether polling is enabled (true/false)
//! - `ORDERLINK_LOG_LEVEL`: Default log level
//! - `ORDERLINK_LOG_JSON`: JSON log output (true/false)
//! - `ORDERLINK_GOOGLE_CLIENT_ID`, `ORDERLINK_GOOGLE_CLIENT_SECRET`,
//!   `ORDERLINK_GOOGLE_REDIRECT_URI`: Google OAuth client; all three enable
//!   the Google Sheets platform
//!
//! ## File Locations
//! `config.toml`, `config.json`, `orderlink.toml` and `orderlink.json`, in
//! the working directory first and then next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use orderlink_domain::{Config, OAuthPlatformConfig, OrderLinkError, PlatformType, Result};

const CONFIG_FILE_NAMES: [&str; 4] = ["config.toml", "config.json", "orderlink.toml", "orderlink.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `OrderLinkError::Config` if no source yields a configuration or
/// the loaded configuration fails validation.
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// Unset optional variables keep their serde defaults. Not validated.
///
/// # Errors
/// Returns `OrderLinkError::Config` if a required variable is missing or a
/// value cannot be parsed.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("ORDERLINK_DB_PATH")?;
    config.security.token_key = env_var("ORDERLINK_TOKEN_KEY")?;

    if let Some(pool_size) = env_parse::<u32>("ORDERLINK_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }
    if let Some(batch_size) = env_parse::<usize>("ORDERLINK_SYNC_BATCH_SIZE")? {
        config.sync.batch_size = batch_size;
    }
    if let Some(concurrency) = env_parse::<usize>("ORDERLINK_SYNC_MAX_CONCURRENCY")? {
        config.sync.max_concurrency = concurrency;
    }
    if let Some(interval) = env_parse::<u64>("ORDERLINK_POLLING_INTERVAL")? {
        config.sync.polling_interval_secs = interval;
    }
    config.sync.polling_enabled = env_bool("ORDERLINK_POLLING_ENABLED", config.sync.polling_enabled);

    if let Ok(level) = std::env::var("ORDERLINK_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("ORDERLINK_LOG_JSON", config.logging.json);

    if let (Ok(client_id), Ok(client_secret), Ok(redirect_uri)) = (
        std::env::var("ORDERLINK_GOOGLE_CLIENT_ID"),
        std::env::var("ORDERLINK_GOOGLE_CLIENT_SECRET"),
        std::env::var("ORDERLINK_GOOGLE_REDIRECT_URI"),
    ) {
        config.oauth.insert(
            PlatformType::GoogleSheets,
            OAuthPlatformConfig::google_sheets(client_id, client_secret, redirect_uri),
        );
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations. Format is detected
/// by extension. Not validated.
///
/// # Errors
/// Returns `OrderLinkError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(OrderLinkError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => find_config_path().ok_or_else(|| {
            OrderLinkError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| OrderLinkError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| OrderLinkError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| OrderLinkError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(OrderLinkError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the working directory, then next to the
/// executable.
pub fn find_config_path() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| OrderLinkError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional variable; unset is `None`, unparseable is an error.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OrderLinkError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
