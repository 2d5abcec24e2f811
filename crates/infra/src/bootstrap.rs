//! Composition root
//!
//! Wires the SQLite repositories, HTTP adapters and core services from a
//! validated [`Config`].

use std::sync::Arc;
use std::time::Duration;

use orderlink_common::{BackoffPolicy, TokenCipher};
use orderlink_core::{
    ConnectionLifecycleManager, ConnectionRepository, LifecycleSettings, PlatformRegistry,
    SheetsClient, SyncOrchestrator, SyncServices, TokenEndpoint, WebhookHandler,
};
use orderlink_domain::{Config, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::database::{DbManager, SqliteConnectionRepository, SqliteOrderRepository, SqliteSyncOperationRepository};
use crate::oauth::{AuthStateCacheConfig, HttpTokenEndpoint, MokaAuthStateStore};
use crate::scheduling::{PollingScheduler, PollingSchedulerConfig};
use crate::sheets::GoogleSheetsClient;

/// Provider-facing adapters, replaceable for tests.
pub struct Adapters {
    /// OAuth token endpoint client.
    pub token_endpoint: Arc<dyn TokenEndpoint>,
    /// Spreadsheet API client.
    pub sheets: Arc<dyn SheetsClient>,
}

impl Adapters {
    /// Real HTTP clients for the configured providers.
    pub fn http() -> Result<Self> {
        Ok(Self {
            token_endpoint: Arc::new(HttpTokenEndpoint::new()?),
            sheets: Arc::new(GoogleSheetsClient::new()?),
        })
    }
}

/// The running engine: services plus the shutdown switch.
pub struct OrderLink {
    /// Shared SQLite pool.
    pub db: Arc<DbManager>,
    /// Connection records.
    pub connections: Arc<dyn ConnectionRepository>,
    /// Sync operation records.
    pub operations: Arc<SqliteSyncOperationRepository>,
    /// Orders, customers and products.
    pub orders: Arc<SqliteOrderRepository>,
    /// Authorization, refresh and revocation.
    pub lifecycle: Arc<ConnectionLifecycleManager>,
    /// Sheet-to-order sync.
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Spreadsheet change notifications.
    pub webhooks: WebhookHandler,
    poller: Option<PollingScheduler>,
    shutdown: CancellationToken,
}

impl OrderLink {
    /// Validate `config`, open the database and wire real adapters.
    pub fn build(config: &Config) -> Result<Self> {
        Self::build_with(config, Adapters::http()?)
    }

    /// Like [`build`](Self::build) with caller-supplied adapters.
    pub fn build_with(config: &Config, adapters: Adapters) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;

        let connections: Arc<dyn ConnectionRepository> =
            Arc::new(SqliteConnectionRepository::new(Arc::clone(&db)));
        let operations = Arc::new(SqliteSyncOperationRepository::new(Arc::clone(&db)));
        let orders = Arc::new(SqliteOrderRepository::new(Arc::clone(&db)));

        let cipher = Arc::new(TokenCipher::from_hex(&config.security.token_key)?);
        let state_config = AuthStateCacheConfig::default();
        state_config.log_config();

        let settings = LifecycleSettings {
            refresh_policy: BackoffPolicy::new(
                config.sync.retry_max_attempts,
                Duration::from_millis(config.sync.retry_base_delay_ms),
            ),
            ..LifecycleSettings::default()
        };
        let lifecycle = Arc::new(
            ConnectionLifecycleManager::new(
                Arc::clone(&connections),
                Arc::new(MokaAuthStateStore::new(&state_config)),
                adapters.token_endpoint,
                cipher,
                PlatformRegistry::new(config.oauth.clone()),
            )
            .with_settings(settings),
        );

        let orchestrator = Arc::new(SyncOrchestrator::new(
            SyncServices {
                connections: Arc::clone(&connections),
                tokens: lifecycle.clone(),
                operations: operations.clone(),
                sheets: adapters.sheets,
                order_lookup: orders.clone(),
                order_store: orders.clone(),
            },
            &config.sync,
            &config.validation,
        )?);

        let shutdown = CancellationToken::new();
        let webhooks = WebhookHandler::new(
            Arc::clone(&connections),
            Arc::clone(&orchestrator),
            config.sync.default_options(),
        )
        .with_shutdown(shutdown.child_token());

        let poller = config.sync.polling_enabled.then(|| {
            PollingScheduler::new(
                Arc::clone(&connections),
                Arc::clone(&orchestrator),
                PollingSchedulerConfig::from_settings(&config.sync),
            )
            .with_shutdown(shutdown.child_token())
        });

        info!(
            db = %db.path().display(),
            platforms = config.oauth.len(),
            polling = config.sync.polling_enabled,
            "OrderLink services ready"
        );

        Ok(Self { db, connections, operations, orders, lifecycle, orchestrator, webhooks, poller, shutdown })
    }

    /// Start background triggers.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(poller) = self.poller.as_mut() {
            poller.start().await?;
        }
        Ok(())
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); pass it to manual syncs.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The poller, when `sync.polling_enabled` is set.
    pub fn polling(&self) -> Option<&PollingScheduler> {
        self.poller.as_ref()
    }

    /// Cancel every in-flight sync and stop the poller.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(poller) = self.poller.as_mut() {
            if poller.is_running() {
                poller.stop().await?;
            }
        }
        info!("OrderLink shut down");
        Ok(())
    }
}
