//! Sync operations, row-level errors and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY};
use crate::errors::{OrderLinkError, Result};

/// What triggered a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Started through the API.
    Manual,
    /// Triggered by a change notification.
    Webhook,
    /// Started by the polling scheduler.
    Polling,
}

crate::impl_domain_status_conversions!(OperationType {
    Manual => "manual",
    Webhook => "webhook",
    Polling => "polling",
});

/// `Pending -> Processing -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created, not started.
    Pending,
    /// Reading and importing rows.
    Processing,
    /// Finished; row errors may still be recorded.
    Completed,
    /// Aborted before finishing.
    Failed,
}

crate::impl_domain_status_conversions!(SyncStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

impl SyncStatus {
    /// `Completed` or `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a forward move.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }
}

/// Row-level failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorCategory {
    /// Row failed validation.
    Validation,
    /// Row matches an existing order.
    Duplicate,
    /// Storage or other internal failure.
    System,
    /// Product could not be resolved.
    ProductNotFound,
    /// Customer could not be created or updated.
    CustomerCreation,
    /// Provider throttled the request.
    RateLimit,
}

crate::impl_domain_status_conversions!(SyncErrorCategory {
    Validation => "validation",
    Duplicate => "duplicate",
    System => "system",
    ProductNotFound => "product_not_found",
    CustomerCreation => "customer_creation",
    RateLimit => "rate_limit",
});

impl SyncErrorCategory {
    /// Validation failures and duplicate skips are counted as skipped rows;
    /// everything else counts as an error.
    #[must_use]
    pub fn counts_as_error(self) -> bool {
        !matches!(self, Self::Validation | Self::Duplicate)
    }
}

/// A failure scoped to one sheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    /// Sheet row, 1-based.
    pub row_number: u32,
    /// Failure kind.
    pub category: SyncErrorCategory,
    /// Human-readable description.
    pub message: String,
    /// Raw row, when available.
    #[serde(default)]
    pub row_data: Option<serde_json::Value>,
    /// Hint shown to the user.
    #[serde(default)]
    pub suggested_fix: Option<String>,
}

impl SyncError {
    /// Error for `row_number` without row data or hint.
    pub fn new(row_number: u32, category: SyncErrorCategory, message: impl Into<String>) -> Self {
        Self { row_number, category, message: message.into(), row_data: None, suggested_fix: None }
    }

    /// Attach the raw row.
    #[must_use]
    pub fn with_row_data(mut self, row_data: serde_json::Value) -> Self {
        self.row_data = Some(row_data);
        self
    }

    /// Attach a hint.
    #[must_use]
    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

/// One execution of a sheet sync.
///
/// Counters are updated after every batch; once the status is terminal the
/// record is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Operation id.
    pub id: String,
    /// Connection the sheet belongs to.
    pub connection_id: String,
    /// Spreadsheet being read.
    pub spreadsheet_id: String,
    /// Trigger.
    pub operation_type: OperationType,
    /// Current status.
    pub status: SyncStatus,
    /// Rows looked at.
    pub orders_processed: u32,
    /// Orders created.
    pub orders_created: u32,
    /// Rows skipped as invalid, duplicate or already imported.
    pub orders_skipped: u32,
    /// Entries in `error_details`.
    pub error_count: u32,
    /// Row-level errors.
    pub error_details: Vec<SyncError>,
    /// Why the run failed, when `Failed`.
    pub failure_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set on `Processing`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncOperation {
    /// A new `Pending` operation.
    pub fn new(
        connection_id: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        operation_type: OperationType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.into(),
            spreadsheet_id: spreadsheet_id.into(),
            operation_type,
            status: SyncStatus::Pending,
            orders_processed: 0,
            orders_created: 0,
            orders_skipped: 0,
            error_count: 0,
            error_details: Vec::new(),
            failure_reason: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next`, stamping start/completion times.
    pub fn transition(&mut self, next: SyncStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(OrderLinkError::InvalidState(format!(
                "sync operation {} cannot move from {} to {next}",
                self.id, self.status
            )));
        }
        match next {
            SyncStatus::Processing => self.started_at = Some(now),
            SyncStatus::Completed | SyncStatus::Failed => self.completed_at = Some(now),
            SyncStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }

    /// Fold one batch worth of results into the counters.
    pub fn record_batch(&mut self, created: u32, skipped: u32, errors: u32, details: &[SyncError]) {
        self.orders_created += created;
        self.orders_skipped += skipped;
        self.error_count += errors;
        self.orders_processed += created + skipped + errors;
        self.error_details.extend_from_slice(details);
    }
}

/// Knobs for one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// First data row (1-based); defaults to the sheet's data start row.
    pub start_row: Option<u32>,
    /// Last row; detected from column A when absent.
    pub end_row: Option<u32>,
    /// Re-import rows that already carry a system reference.
    pub force_resync: bool,
    /// Rows per batch.
    pub batch_size: usize,
    /// Rows processed at once within a batch.
    pub max_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            start_row: None,
            end_row: None,
            force_resync: false,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Outcome of a sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Operation the report describes.
    pub sync_operation_id: String,
    /// `errors` is empty, or at least one order was created. Validation and
    /// duplicate entries count as errors here even though they are tallied
    /// as skips.
    pub success: bool,
    /// `errors` is non-empty and at least one order was created.
    pub partial: bool,
    /// Rows looked at.
    pub orders_processed: u32,
    /// Orders created.
    pub orders_created: u32,
    /// Rows skipped.
    pub orders_skipped: u32,
    /// Entries in `errors`.
    pub error_count: u32,
    /// Row-level errors.
    pub errors: Vec<SyncError>,
    /// Wall time of the run.
    pub duration_ms: u64,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> SyncOperation {
        SyncOperation::new("conn-1", "sheet-1", OperationType::Manual, Utc::now())
    }

    #[test]
    fn transitions_follow_lifecycle() {
        let mut op = op();
        assert!(op.transition(SyncStatus::Completed, Utc::now()).is_err());
        op.transition(SyncStatus::Processing, Utc::now()).unwrap();
        assert!(op.started_at.is_some());
        op.transition(SyncStatus::Completed, Utc::now()).unwrap();
        assert!(op.completed_at.is_some());
        assert!(op.transition(SyncStatus::Failed, Utc::now()).is_err());
        assert!(op.transition(SyncStatus::Processing, Utc::now()).is_err());
    }

    #[test]
    fn batch_counters_accumulate() {
        let mut op = op();
        let details = vec![SyncError::new(4, SyncErrorCategory::Validation, "missing phone")];
        op.record_batch(7, 2, 1, &details);
        op.record_batch(3, 0, 0, &[]);
        assert_eq!(op.orders_processed, 13);
        assert_eq!(op.orders_created, 10);
        assert_eq!(op.error_details.len(), 1);
    }

    #[test]
    fn only_system_categories_count_as_errors() {
        assert!(!SyncErrorCategory::Validation.counts_as_error());
        assert!(!SyncErrorCategory::Duplicate.counts_as_error());
        assert!(SyncErrorCategory::System.counts_as_error());
        assert!(SyncErrorCategory::RateLimit.counts_as_error());
    }

    #[test]
    fn category_text_form() {
        assert_eq!(SyncErrorCategory::ProductNotFound.as_str(), "product_not_found");
        let json = serde_json::to_string(&SyncErrorCategory::CustomerCreation).unwrap();
        assert_eq!(json, "\"customer_creation\"");
    }
}
