//! Push-notification trigger
//!
//! A notification only says "this file changed"; the handler resolves the
//! linked spreadsheet from the channel id and runs a regular sync for it.

use std::sync::Arc;

use chrono::Utc;
use orderlink_domain::{
    OperationType, OrderLinkError, PlatformType, Result, SyncOptions, SyncReport, WebhookNotification,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::orchestrator::SyncOrchestrator;
use crate::connections::ports::ConnectionRepository;

/// What the handler did with a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Nothing to sync; the reason is for logs and responses.
    Ignored(String),
    /// A sync ran; its report.
    Synced(SyncReport),
}

/// Handles spreadsheet change notifications.
pub struct WebhookHandler {
    connections: Arc<dyn ConnectionRepository>,
    orchestrator: Arc<SyncOrchestrator>,
    options: SyncOptions,
    shutdown: CancellationToken,
}

impl WebhookHandler {
    /// Handler running syncs with `options`.
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        orchestrator: Arc<SyncOrchestrator>,
        options: SyncOptions,
    ) -> Self {
        Self { connections, orchestrator, options, shutdown: CancellationToken::new() }
    }

    /// Cancel in-flight webhook syncs when `token` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Validate the notification against its channel and sync the
    /// spreadsheet it belongs to.
    ///
    /// Handshakes are ignored. Unknown channels fail with `NotFound`;
    /// expired channels and token or resource mismatches fail with
    /// `Unauthorized`.
    #[instrument(skip(self, notification), fields(channel_id = %notification.id, state = %notification.resource_state))]
    pub async fn handle(&self, notification: &WebhookNotification) -> Result<WebhookOutcome> {
        if notification.is_sync_handshake() {
            debug!("Webhook channel handshake");
            return Ok(WebhookOutcome::Ignored("sync handshake".into()));
        }

        let connections = self.connections.list_active(PlatformType::GoogleSheets).await?;
        let Some((connection, linked)) = connections.iter().find_map(|connection| {
            connection.spreadsheet_for_channel(&notification.id).map(|linked| (connection, linked))
        }) else {
            warn!("Notification for unknown channel");
            return Err(OrderLinkError::NotFound(format!("webhook channel {}", notification.id)));
        };
        let Some(channel) = linked.webhook_channel.as_ref() else {
            return Err(OrderLinkError::NotFound(format!("webhook channel {}", notification.id)));
        };

        let now = Utc::now();
        if channel.is_expired(now) || notification.expiration.is_some_and(|expiration| expiration <= now) {
            warn!(spreadsheet_id = %linked.spreadsheet_id, "Notification on expired channel");
            return Err(OrderLinkError::Unauthorized("webhook channel expired".into()));
        }
        if channel.token.is_some() && channel.token != notification.token {
            warn!(spreadsheet_id = %linked.spreadsheet_id, "Webhook token mismatch");
            return Err(OrderLinkError::Unauthorized("webhook token mismatch".into()));
        }
        if let (Some(expected), Some(actual)) = (&channel.resource_id, &notification.resource_id) {
            if expected != actual {
                warn!(spreadsheet_id = %linked.spreadsheet_id, "Webhook resource mismatch");
                return Err(OrderLinkError::Unauthorized("webhook resource mismatch".into()));
            }
        }

        info!(connection_id = %connection.id, spreadsheet_id = %linked.spreadsheet_id, "Webhook triggered sync");
        let report = self
            .orchestrator
            .start_sync(&connection.id, &linked.spreadsheet_id, OperationType::Webhook, &self.options, &self.shutdown)
            .await?;
        Ok(WebhookOutcome::Synced(report))
    }
}
