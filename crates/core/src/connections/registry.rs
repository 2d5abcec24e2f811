//! OAuth client settings per platform

use std::collections::BTreeMap;

use orderlink_domain::{OAuthPlatformConfig, OrderLinkError, PlatformType, Result};

/// Lookup of OAuth client registrations, built from configuration.
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    platforms: BTreeMap<PlatformType, OAuthPlatformConfig>,
}

impl PlatformRegistry {
    /// Registry over an explicit platform map.
    #[must_use]
    pub fn new(platforms: BTreeMap<PlatformType, OAuthPlatformConfig>) -> Self {
        Self { platforms }
    }

    /// Add or replace one platform's configuration.
    #[must_use]
    pub fn with(mut self, config: OAuthPlatformConfig) -> Self {
        self.platforms.insert(config.platform, config);
        self
    }

    /// Settings for `platform`; `Config` error when it is not registered.
    pub fn get(&self, platform: PlatformType) -> Result<&OAuthPlatformConfig> {
        self.platforms
            .get(&platform)
            .ok_or_else(|| OrderLinkError::Config(format!("platform {platform} is not configured")))
    }

    /// Whether `platform` has OAuth settings.
    #[must_use]
    pub fn is_configured(&self, platform: PlatformType) -> bool {
        self.platforms.contains_key(&platform)
    }
}
