//! Interval-driven sync of every linked spreadsheet.
//!
//! Each tick lists active Google Sheets connections and runs a `polling`
//! sync for every spreadsheet they link, one after another. Failures are
//! logged and recorded on the sync operation; they never stop the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use orderlink_core::{ConnectionRepository, SyncOrchestrator};
use orderlink_domain::constants::DEFAULT_POLLING_INTERVAL_SECS;
use orderlink_domain::{OperationType, PlatformType, Result, SyncOptions, SyncSettings};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the polling scheduler
#[derive(Debug, Clone)]
pub struct PollingSchedulerConfig {
    /// Delay between the end of one tick and the start of the next
    pub interval: Duration,
    /// Options for every polling sync
    pub options: SyncOptions,
    /// Upper bound for waiting on the loop during `stop`
    pub stop_timeout: Duration,
}

impl Default for PollingSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLLING_INTERVAL_SECS),
            options: SyncOptions::default(),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

impl PollingSchedulerConfig {
    /// Interval and options from the sync settings.
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.polling_interval_secs),
            options: settings.default_options(),
            ..Self::default()
        }
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Spreadsheets synced without error.
    pub synced: usize,
    /// Spreadsheets whose sync returned an error.
    pub failed: usize,
}

struct PollContext {
    connections: Arc<dyn ConnectionRepository>,
    orchestrator: Arc<SyncOrchestrator>,
    options: SyncOptions,
}

/// Periodic trigger for spreadsheet syncs
pub struct PollingScheduler {
    context: Arc<PollContext>,
    config: PollingSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl PollingScheduler {
    /// Scheduler over the active Google Sheets connections; not started.
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        orchestrator: Arc<SyncOrchestrator>,
        config: PollingSchedulerConfig,
    ) -> Self {
        let context =
            Arc::new(PollContext { connections, orchestrator, options: config.options.clone() });
        Self {
            context,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Stop polling when `token` is cancelled, in addition to [`stop`](Self::stop).
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Spawn the polling loop. The first tick runs after one interval.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if the loop is active.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        if self.cancellation_token.is_cancelled() {
            self.cancellation_token = CancellationToken::new();
        }

        let context = Arc::clone(&self.context);
        let interval = self.config.interval;
        let cancel = self.cancellation_token.clone();
        let handle = tokio::spawn(async move {
            Self::poll_loop(context, interval, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = interval.as_secs(), "Polling scheduler started");
        Ok(())
    }

    /// Cancel the loop and any sync in flight, then wait for it.
    ///
    /// # Errors
    /// Returns `NotRunning` if the loop is not active, `Timeout` if it does
    /// not finish within the stop timeout.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.stop_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("Polling scheduler stopped");
        Ok(())
    }

    /// Whether the tick loop is running.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Run one polling pass now.
    ///
    /// # Errors
    /// Fails only when the active connections cannot be listed.
    pub async fn tick(&self) -> Result<PollSummary> {
        Self::poll_once(&self.context, &self.cancellation_token).await
    }

    async fn poll_loop(context: Arc<PollContext>, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Polling loop cancelled");
                    break;
                }
                () = tokio::time::sleep(interval) => {
                    let started = Instant::now();
                    match Self::poll_once(&context, &cancel).await {
                        Ok(summary) => info!(
                            synced = summary.synced,
                            failed = summary.failed,
                            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                            "Polling tick completed"
                        ),
                        Err(e) => error!(error = %e, "Polling tick failed"),
                    }
                }
            }
        }
    }

    async fn poll_once(context: &PollContext, cancel: &CancellationToken) -> Result<PollSummary> {
        let connections = context.connections.list_active(PlatformType::GoogleSheets).await?;
        let mut summary = PollSummary::default();

        for connection in &connections {
            let Some(data) = connection.platform_data.google_sheets() else {
                continue;
            };
            for linked in &data.spreadsheets {
                if cancel.is_cancelled() {
                    debug!("Polling pass interrupted by shutdown");
                    return Ok(summary);
                }

                let result = context
                    .orchestrator
                    .start_sync(
                        &connection.id,
                        &linked.spreadsheet_id,
                        OperationType::Polling,
                        &context.options,
                        cancel,
                    )
                    .await;
                match result {
                    Ok(report) => {
                        debug!(
                            connection_id = %connection.id,
                            spreadsheet_id = %linked.spreadsheet_id,
                            created = report.orders_created,
                            "Polling sync finished"
                        );
                        summary.synced += 1;
                    }
                    Err(e) => {
                        warn!(
                            connection_id = %connection.id,
                            spreadsheet_id = %linked.spreadsheet_id,
                            error = %e,
                            "Polling sync failed"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }
}
