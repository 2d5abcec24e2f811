//! In-memory authorization state with moka
//!
//! Holds the `state` → context and `state` → PKCE verifier mappings for the
//! duration of an authorization round trip. Entries expire after the
//! authorization window and are removed on first read, so a state token
//! can be redeemed once.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use orderlink_core::AuthStateStore;
use orderlink_domain::constants::AUTH_STATE_TTL_SECS;
use orderlink_domain::{AuthorizationState, Result};

/// Default max number of pending authorizations kept in memory.
pub const DEFAULT_AUTH_STATE_MAX_CAPACITY: u64 = 10_000;

/// Authorization state cache configuration
#[derive(Debug, Clone)]
pub struct AuthStateCacheConfig {
    /// Time-to-live for pending authorizations
    pub ttl: Duration,

    /// Maximum number of entries in each cache
    pub max_capacity: u64,
}

impl Default for AuthStateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(AUTH_STATE_TTL_SECS.unsigned_abs()),
            max_capacity: DEFAULT_AUTH_STATE_MAX_CAPACITY,
        }
    }
}

impl AuthStateCacheConfig {
    /// Create config with custom TTL (useful for testing)
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, max_capacity: DEFAULT_AUTH_STATE_MAX_CAPACITY }
    }

    /// Log configuration at startup
    pub fn log_config(&self) {
        tracing::info!(
            ttl_seconds = self.ttl.as_secs(),
            max_capacity = self.max_capacity,
            "authorization state cache configuration loaded"
        );
    }
}

/// [`AuthStateStore`] backed by two TTL caches.
pub struct MokaAuthStateStore {
    states: Cache<String, AuthorizationState>,
    verifiers: Cache<String, String>,
}

impl MokaAuthStateStore {
    /// Store with the configured TTL and capacity.
    pub fn new(config: &AuthStateCacheConfig) -> Self {
        Self {
            states: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build(),
            verifiers: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build(),
        }
    }

    /// Number of pending authorizations (approximate until housekeeping runs).
    pub fn pending(&self) -> u64 {
        self.states.run_pending_tasks();
        self.states.entry_count()
    }
}

impl Default for MokaAuthStateStore {
    fn default() -> Self {
        Self::new(&AuthStateCacheConfig::default())
    }
}

#[async_trait]
impl AuthStateStore for MokaAuthStateStore {
    async fn put_state(&self, state: &str, context: AuthorizationState) -> Result<()> {
        self.states.insert(state.to_string(), context);
        Ok(())
    }

    async fn take_state(&self, state: &str) -> Result<Option<AuthorizationState>> {
        Ok(self.states.remove(state))
    }

    async fn put_verifier(&self, state: &str, verifier: String) -> Result<()> {
        self.verifiers.insert(state.to_string(), verifier);
        Ok(())
    }

    async fn take_verifier(&self, state: &str) -> Result<Option<String>> {
        Ok(self.verifiers.remove(state))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use orderlink_domain::PlatformType;

    use super::*;

    fn context() -> AuthorizationState {
        AuthorizationState {
            owner_id: "user-1".into(),
            organization_id: "org-1".into(),
            platform: PlatformType::GoogleSheets,
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn state_is_redeemable_once() {
        let store = MokaAuthStateStore::default();
        let ctx = context();
        store.put_state("s1", ctx.clone()).await.unwrap();
        store.put_verifier("s1", "v1".into()).await.unwrap();
        assert_eq!(store.pending(), 1);

        assert_eq!(store.take_state("s1").await.unwrap(), Some(ctx));
        assert_eq!(store.take_state("s1").await.unwrap(), None);
        assert_eq!(store.take_verifier("s1").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(store.take_verifier("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MokaAuthStateStore::new(&AuthStateCacheConfig::with_ttl(Duration::from_millis(50)));
        store.put_state("s2", context()).await.unwrap();

        std::thread::sleep(Duration::from_millis(120));

        assert_eq!(store.take_state("s2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_state_is_none() {
        let store = MokaAuthStateStore::default();
        assert!(store.take_state("missing").await.unwrap().is_none());
        assert!(store.take_verifier("missing").await.unwrap().is_none());
    }
}
