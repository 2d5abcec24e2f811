//! Batch sync orchestrator
//!
//! Reads a linked spreadsheet, then processes its rows in sequential batches
//! with bounded concurrency inside each batch. Every row ends as created,
//! skipped or failed; row failures are recorded on the [`SyncOperation`]
//! and never abort the run. Only operation-wide problems (connection,
//! token, sheet read) or cancellation fail the whole operation.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use orderlink_common::resilience::BackoffPolicy;
use orderlink_domain::{
    OperationType, OrderLinkError, OrderSource, Result, SheetOrder, SyncError, SyncErrorCategory,
    SyncOperation, SyncOptions, SyncReport, SyncSettings, SyncStatus, ValidationRules,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::feedback::{FeedbackKind, FeedbackWriter, RowFeedback};
use super::ports::{AccessTokenProvider, SyncOperationRepository};
use super::validation::RowValidator;
use crate::connections::ports::ConnectionRepository;
use crate::duplicates::ports::OrderLookup;
use crate::duplicates::{DuplicateDetector, DuplicateResolution};
use crate::orders::ports::OrderStore;
use crate::orders::{MaterializeError, OrderContext, OrderMaterializer};
use crate::sheets::ports::SheetsClient;
use crate::sheets::{MalformedRow, SheetReader};

/// Ports the orchestrator works through.
#[derive(Clone)]
pub struct SyncServices {
    /// Connection records and sync bookkeeping.
    pub connections: Arc<dyn ConnectionRepository>,
    /// Access tokens for spreadsheet calls.
    pub tokens: Arc<dyn AccessTokenProvider>,
    /// Sync operation records.
    pub operations: Arc<dyn SyncOperationRepository>,
    /// Spreadsheet API.
    pub sheets: Arc<dyn SheetsClient>,
    /// Existing orders for duplicate detection.
    pub order_lookup: Arc<dyn OrderLookup>,
    /// Customer, product and order writes.
    pub order_store: Arc<dyn OrderStore>,
}

/// Result of processing one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Order created, possibly flagged for review.
    Created { row_number: u32, order_number: String, flagged: bool },
    /// Already imported or invalid. `error` is `None` for rows skipped
    /// because they already carry a system reference.
    Skipped { row_number: u32, error: Option<SyncError> },
    /// Matches an existing order closely enough to skip.
    Duplicate { existing_order_number: String, error: SyncError },
    /// Materialization failed for this row.
    Failed(SyncError),
}

impl RowOutcome {
    fn feedback(&self) -> Option<RowFeedback> {
        let (row_number, kind) = match self {
            Self::Created { row_number, order_number, flagged } => {
                (*row_number, FeedbackKind::Created { order_number: order_number.clone(), flagged: *flagged })
            }
            Self::Skipped { row_number, error: Some(error) } => {
                (*row_number, FeedbackKind::Failed { message: error.message.clone() })
            }
            Self::Skipped { error: None, .. } => return None,
            Self::Duplicate { existing_order_number, error } => (
                error.row_number,
                FeedbackKind::Duplicate { existing_order_number: existing_order_number.clone() },
            ),
            Self::Failed(error) => (error.row_number, FeedbackKind::Failed { message: error.message.clone() }),
        };
        Some(RowFeedback { row_number, kind })
    }
}

/// Counters for one batch.
#[derive(Debug, Default)]
struct BatchTally {
    created: u32,
    skipped: u32,
    errors: u32,
    details: Vec<SyncError>,
}

impl BatchTally {
    fn add(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Created { .. } => self.created += 1,
            RowOutcome::Skipped { error, .. } => {
                self.skipped += 1;
                self.details.extend(error.iter().cloned());
            }
            RowOutcome::Duplicate { error, .. } => {
                self.skipped += 1;
                self.details.push(error.clone());
            }
            RowOutcome::Failed(error) => {
                self.errors += 1;
                self.details.push(error.clone());
            }
        }
    }
}

/// Category of an unexpected row failure, from its message.
fn category_from_message(message: &str) -> SyncErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("quota") || lower.contains("429") {
        SyncErrorCategory::RateLimit
    } else if lower.contains("product") {
        SyncErrorCategory::ProductNotFound
    } else if lower.contains("customer") {
        SyncErrorCategory::CustomerCreation
    } else {
        SyncErrorCategory::System
    }
}

fn categorize(err: &OrderLinkError) -> SyncErrorCategory {
    match err {
        OrderLinkError::RateLimited(_) => SyncErrorCategory::RateLimit,
        other => category_from_message(&other.to_string()),
    }
}

fn categorize_materialize(err: &MaterializeError) -> SyncErrorCategory {
    match err {
        MaterializeError::Customer(_) => SyncErrorCategory::CustomerCreation,
        MaterializeError::Product(_) => SyncErrorCategory::ProductNotFound,
        MaterializeError::Commit(cause) => categorize(cause),
    }
}

fn row_error(row: &SheetOrder, category: SyncErrorCategory, message: String) -> SyncError {
    let error = SyncError::new(row.row_number, category, message);
    match serde_json::to_value(row) {
        Ok(row_data) => error.with_row_data(row_data),
        Err(_) => error,
    }
}

fn malformed_error(row: &MalformedRow) -> SyncError {
    SyncError::new(row.row_number, SyncErrorCategory::Validation, row.reason.clone())
        .with_suggested_fix("Use a date such as 2024-01-31 or 31/01/2024")
}

fn cancelled(operation: &SyncOperation) -> OrderLinkError {
    OrderLinkError::Internal(format!(
        "sync operation {} cancelled after {} rows",
        operation.id, operation.orders_processed
    ))
}

/// Runs sheet syncs.
pub struct SyncOrchestrator {
    services: SyncServices,
    reader: SheetReader,
    detector: DuplicateDetector,
    materializer: OrderMaterializer,
    validator: RowValidator,
    feedback: FeedbackWriter,
    inter_batch_delay: StdDuration,
    feedback_enabled: bool,
}

impl SyncOrchestrator {
    /// Fails with `Config` when the validation rules do not compile.
    pub fn new(services: SyncServices, settings: &SyncSettings, rules: &ValidationRules) -> Result<Self> {
        let policy = BackoffPolicy::new(
            settings.retry_max_attempts,
            StdDuration::from_millis(settings.retry_base_delay_ms),
        );
        Ok(Self {
            reader: SheetReader::new(Arc::clone(&services.sheets)).with_policy(policy),
            detector: DuplicateDetector::new(Arc::clone(&services.order_lookup)),
            materializer: OrderMaterializer::new(Arc::clone(&services.order_store))
                .with_default_stock(settings.default_product_stock),
            validator: RowValidator::new(rules)?,
            feedback: FeedbackWriter::new(Arc::clone(&services.sheets), policy),
            inter_batch_delay: StdDuration::from_millis(settings.inter_batch_delay_ms),
            feedback_enabled: settings.feedback_enabled,
            services,
        })
    }

    /// Create a `Pending` operation of `operation_type` and run it.
    pub async fn start_sync(
        &self,
        connection_id: &str,
        spreadsheet_id: &str,
        operation_type: OperationType,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let operation = SyncOperation::new(connection_id, spreadsheet_id, operation_type, Utc::now());
        self.services.operations.create(&operation).await?;
        self.sync_orders_from_sheet(connection_id, spreadsheet_id, &operation.id, options, cancel)
            .await
    }

    /// Run the pending operation `sync_operation_id` against a linked
    /// spreadsheet.
    ///
    /// Completed runs return a report. Operation-wide failures and
    /// cancellation mark the operation `Failed` (keeping the counters
    /// reached so far) and return the error.
    #[instrument(skip(self, options, cancel))]
    pub async fn sync_orders_from_sheet(
        &self,
        connection_id: &str,
        spreadsheet_id: &str,
        sync_operation_id: &str,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let clock = Instant::now();
        let mut operation = self
            .services
            .operations
            .find_by_id(sync_operation_id)
            .await?
            .ok_or_else(|| OrderLinkError::NotFound(format!("sync operation {sync_operation_id}")))?;
        operation.transition(SyncStatus::Processing, Utc::now())?;
        self.services.operations.save(&operation).await?;

        match self.run(&mut operation, connection_id, spreadsheet_id, options, cancel).await {
            Ok(()) => {
                let now = Utc::now();
                operation.transition(SyncStatus::Completed, now)?;
                self.services.operations.save(&operation).await?;
                if let Err(err) = self.services.connections.record_sync(connection_id, now).await {
                    warn!(error = %err, "Failed to record sync on connection");
                }
                let report = Self::report(&operation, clock.elapsed());
                info!(
                    created = report.orders_created,
                    skipped = report.orders_skipped,
                    errors = report.error_count,
                    duration_ms = report.duration_ms,
                    "Sync completed"
                );
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, processed = operation.orders_processed, "Sync failed");
                operation.failure_reason = Some(err.to_string());
                operation.transition(SyncStatus::Failed, Utc::now())?;
                if let Err(save_err) = self.services.operations.save(&operation).await {
                    warn!(error = %save_err, "Failed to persist failed sync operation");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        operation: &mut SyncOperation,
        connection_id: &str,
        spreadsheet_id: &str,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let connection = self
            .services
            .connections
            .find_by_id(connection_id)
            .await?
            .ok_or_else(|| OrderLinkError::NotFound(format!("connection {connection_id}")))?;
        let linked = connection.linked_spreadsheet(spreadsheet_id).cloned().ok_or_else(|| {
            OrderLinkError::NotFound(format!("spreadsheet {spreadsheet_id} is not linked to connection {connection_id}"))
        })?;

        let access_token = self.services.tokens.access_token(connection_id).await?;
        let read = self
            .reader
            .read_orders(
                &access_token,
                spreadsheet_id,
                &linked.sheet,
                options.start_row,
                options.end_row,
                Utc::now().date_naive(),
            )
            .await?;

        if !read.malformed.is_empty() {
            let details: Vec<SyncError> = read.malformed.iter().map(malformed_error).collect();
            operation.record_batch(0, u32::try_from(details.len()).unwrap_or(u32::MAX), 0, &details);
        }
        if read.orders.is_empty() {
            debug!("No rows to sync");
            return Ok(());
        }

        let context = OrderContext {
            organization_id: connection.organization_id.clone(),
            sync_operation_id: operation.id.clone(),
            spreadsheet_id: spreadsheet_id.to_string(),
            source: OrderSource::from(connection.platform),
        };
        let batch_size = options.batch_size.max(1);
        let concurrency = options.max_concurrency.max(1);
        let batch_count = read.orders.len().div_ceil(batch_size);
        let mut feedback = Vec::new();

        for (index, batch) in read.orders.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(cancelled(operation));
            }

            let pending: Vec<_> = batch
                .iter()
                .map(|row| self.process_sheet_order(&context, row, options.force_resync))
                .collect();
            let outcomes: Vec<RowOutcome> = stream::iter(pending)
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let mut tally = BatchTally::default();
            for outcome in &outcomes {
                tally.add(outcome);
                feedback.extend(outcome.feedback());
            }
            operation.record_batch(tally.created, tally.skipped, tally.errors, &tally.details);
            self.services.operations.save(operation).await?;
            debug!(
                batch = index + 1,
                of = batch_count,
                created = tally.created,
                skipped = tally.skipped,
                errors = tally.errors,
                "Batch processed"
            );

            if index + 1 < batch_count && !self.inter_batch_delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return Err(cancelled(operation)),
                    () = tokio::time::sleep(self.inter_batch_delay) => {}
                }
            }
        }

        if self.feedback_enabled && !feedback.is_empty() {
            feedback.sort_by_key(|entry: &RowFeedback| entry.row_number);
            self.feedback
                .write(&access_token, spreadsheet_id, &linked.sheet.sheet_name, &read.mapping, &feedback)
                .await;
        }
        Ok(())
    }

    /// Process one row: reference skip, validation, duplicate detection,
    /// then materialization. Never fails; problems become the outcome.
    pub async fn process_sheet_order(&self, context: &OrderContext, row: &SheetOrder, force_resync: bool) -> RowOutcome {
        if row.has_system_reference() && !force_resync {
            debug!(row = row.row_number, "Row already imported");
            return RowOutcome::Skipped { row_number: row.row_number, error: None };
        }

        let issues = self.validator.validate(row);
        if !issues.is_empty() {
            return RowOutcome::Skipped {
                row_number: row.row_number,
                error: Some(RowValidator::to_sync_error(row, &issues)),
            };
        }

        let detection = match self.detector.detect(&context.organization_id, row).await {
            Ok(detection) => detection,
            Err(err) => {
                warn!(row = row.row_number, error = %err, "Duplicate detection failed");
                return RowOutcome::Failed(row_error(row, categorize(&err), err.to_string()));
            }
        };

        let flag_note = match DuplicateResolution::from_detection(&detection) {
            DuplicateResolution::Skip { existing_order_number, score } => {
                let error = SyncError::new(
                    row.row_number,
                    SyncErrorCategory::Duplicate,
                    format!("duplicate of order {existing_order_number} (score {score:.2})"),
                )
                .with_suggested_fix(format!(
                    "Already imported as {existing_order_number}; force a resync to import it again"
                ));
                return RowOutcome::Duplicate { existing_order_number, error };
            }
            DuplicateResolution::Create => None,
            DuplicateResolution::CreateFlagged { note } => Some(note),
        };

        match self.materializer.materialize(context, row, flag_note).await {
            Ok(order) => RowOutcome::Created {
                row_number: row.row_number,
                order_number: order.order_number,
                flagged: order.flagged,
            },
            Err(err) => {
                warn!(row = row.row_number, error = %err, "Order creation failed");
                RowOutcome::Failed(row_error(row, categorize_materialize(&err), err.to_string()))
            }
        }
    }

    /// Past operations of a connection, most recent first.
    pub async fn history(&self, connection_id: &str, limit: usize) -> Result<Vec<SyncOperation>> {
        self.services.operations.list_by_connection(connection_id, limit).await
    }

    fn report(operation: &SyncOperation, elapsed: StdDuration) -> SyncReport {
        let completed_at = operation.completed_at.unwrap_or_else(Utc::now);
        SyncReport {
            sync_operation_id: operation.id.clone(),
            success: operation.error_details.is_empty() || operation.orders_created > 0,
            partial: !operation.error_details.is_empty() && operation.orders_created > 0,
            orders_processed: operation.orders_processed,
            orders_created: operation.orders_created,
            orders_skipped: operation.orders_skipped,
            error_count: operation.error_count,
            errors: operation.error_details.clone(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            started_at: operation.started_at.unwrap_or(completed_at),
            completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_heuristics() {
        assert_eq!(category_from_message("Quota exceeded for sheets"), SyncErrorCategory::RateLimit);
        assert_eq!(category_from_message("product lookup failed"), SyncErrorCategory::ProductNotFound);
        assert_eq!(category_from_message("Customer insert rejected"), SyncErrorCategory::CustomerCreation);
        assert_eq!(category_from_message("disk I/O error"), SyncErrorCategory::System);
    }

    #[test]
    fn materialize_errors_map_by_step() {
        let db = OrderLinkError::Database("locked".into());
        assert_eq!(categorize_materialize(&MaterializeError::Customer(db.clone())), SyncErrorCategory::CustomerCreation);
        assert_eq!(categorize_materialize(&MaterializeError::Product(db.clone())), SyncErrorCategory::ProductNotFound);
        assert_eq!(categorize_materialize(&MaterializeError::Commit(db)), SyncErrorCategory::System);
        assert_eq!(
            categorize_materialize(&MaterializeError::Commit(OrderLinkError::RateLimited("slow down".into()))),
            SyncErrorCategory::RateLimit
        );
    }

    #[test]
    fn tally_counts_each_outcome() {
        let mut tally = BatchTally::default();
        tally.add(&RowOutcome::Created { row_number: 2, order_number: "GS202401100001".into(), flagged: false });
        tally.add(&RowOutcome::Skipped { row_number: 3, error: None });
        tally.add(&RowOutcome::Skipped {
            row_number: 4,
            error: Some(SyncError::new(4, SyncErrorCategory::Validation, "phone is required")),
        });
        tally.add(&RowOutcome::Duplicate {
            existing_order_number: "GS202401100001".into(),
            error: SyncError::new(6, SyncErrorCategory::Duplicate, "duplicate"),
        });
        tally.add(&RowOutcome::Failed(SyncError::new(5, SyncErrorCategory::System, "boom")));
        assert_eq!((tally.created, tally.skipped, tally.errors), (1, 3, 1));
        assert_eq!(tally.details.len(), 3);
    }

    fn finished(created: u32, details: Vec<SyncError>) -> SyncOperation {
        let mut operation = SyncOperation::new("conn-1", "sheet-1", OperationType::Manual, Utc::now());
        let skipped = u32::try_from(details.len()).unwrap();
        operation.record_batch(created, skipped, 0, &details);
        operation
    }

    #[test]
    fn report_counts_skipped_row_errors_against_success() {
        let invalid = || SyncError::new(2, SyncErrorCategory::Validation, "phone is required");

        let only_invalid = SyncOrchestrator::report(&finished(0, vec![invalid()]), StdDuration::ZERO);
        assert!(!only_invalid.success);
        assert!(!only_invalid.partial);
        assert_eq!(only_invalid.error_count, 0);

        let mixed = SyncOrchestrator::report(&finished(1, vec![invalid()]), StdDuration::ZERO);
        assert!(mixed.success);
        assert!(mixed.partial);

        let clean = SyncOrchestrator::report(&finished(2, Vec::new()), StdDuration::ZERO);
        assert!(clean.success);
        assert!(!clean.partial);
    }
}
