//! Write sync results back into the source sheet
//!
//! Order numbers, statuses and error messages go into their mapped columns
//! and processed rows are highlighted. The orders are already committed by
//! the time feedback runs, so failures here are logged and swallowed.

use std::sync::Arc;

use orderlink_common::resilience::{retry_with_backoff, BackoffPolicy};
use orderlink_domain::{ColumnMapping, SheetField};
use tracing::{debug, warn};

use crate::sheets::ports::{CellUpdate, RowHighlight, SheetsClient, SheetsError};
use crate::sheets::reader::cell_ref;

/// What happened to a row, as reported back to the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackKind {
    /// Order created; the number goes to the reference column.
    Created { order_number: String, flagged: bool },
    /// Skipped as a duplicate of an existing order.
    Duplicate { existing_order_number: String },
    /// Row rejected or failed; the message goes to the error column.
    Failed { message: String },
}

/// Result of one row, as written back to the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFeedback {
    /// 1-based sheet row.
    pub row_number: u32,
    /// What to write.
    pub kind: FeedbackKind,
}

/// Cell writes and highlights for a set of row results. Columns that are
/// not mapped are left alone.
#[must_use]
pub fn plan_feedback(
    sheet_name: &str,
    mapping: &ColumnMapping,
    feedback: &[RowFeedback],
) -> (Vec<CellUpdate>, Vec<(u32, RowHighlight)>) {
    let reference = mapping.column_for(SheetField::Reference);
    let status = mapping.column_for(SheetField::Status);
    let error = mapping.column_for(SheetField::Error);

    let mut updates = Vec::new();
    let mut highlights = Vec::new();
    let mut write = |column: Option<&str>, row: u32, value: &str| {
        if let Some(column) = column {
            updates.push(CellUpdate::single(cell_ref(sheet_name, column, row), value));
        }
    };

    for entry in feedback {
        let row = entry.row_number;
        match &entry.kind {
            FeedbackKind::Created { order_number, flagged } => {
                write(reference, row, order_number);
                write(status, row, if *flagged { "flagged" } else { "created" });
                write(error, row, "");
                highlights.push((row, if *flagged { RowHighlight::Flagged } else { RowHighlight::Created }));
            }
            FeedbackKind::Duplicate { existing_order_number } => {
                write(status, row, &format!("duplicate of {existing_order_number}"));
            }
            FeedbackKind::Failed { message } => {
                write(error, row, message);
                highlights.push((row, RowHighlight::Failed));
            }
        }
    }
    (updates, highlights)
}

/// Applies feedback through a [`SheetsClient`], retrying transient
/// failures.
pub struct FeedbackWriter {
    client: Arc<dyn SheetsClient>,
    policy: BackoffPolicy,
}

impl FeedbackWriter {
    /// Writer retrying under `policy`.
    pub fn new(client: Arc<dyn SheetsClient>, policy: BackoffPolicy) -> Self {
        Self { client, policy }
    }

    /// Write `feedback` into the sheet. Never fails; problems are logged.
    pub async fn write(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        mapping: &ColumnMapping,
        feedback: &[RowFeedback],
    ) {
        let (updates, highlights) = plan_feedback(sheet_name, mapping, feedback);

        if !updates.is_empty() {
            let client = Arc::clone(&self.client);
            let result = retry_with_backoff(&self.policy, SheetsError::is_retryable, |_| {
                let client = Arc::clone(&client);
                let updates = &updates;
                async move { client.update_values(access_token, spreadsheet_id, updates).await }
            })
            .await;
            match result {
                Ok(()) => debug!(cells = updates.len(), "Wrote sync feedback cells"),
                Err(err) => warn!(spreadsheet_id, error = %err, "Failed to write sync feedback cells"),
            }
        }

        if !highlights.is_empty() {
            let client = Arc::clone(&self.client);
            let result = retry_with_backoff(&self.policy, SheetsError::is_retryable, |_| {
                let client = Arc::clone(&client);
                let highlights = &highlights;
                async move { client.highlight_rows(access_token, spreadsheet_id, sheet_name, highlights).await }
            })
            .await;
            match result {
                Ok(()) => debug!(rows = highlights.len(), "Highlighted synced rows"),
                Err(err) => warn!(spreadsheet_id, error = %err, "Failed to highlight synced rows"),
            }
        }
    }
}
