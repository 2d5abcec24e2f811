//! Sync operation repository implementation

use std::sync::Arc;

use async_trait::async_trait;
use orderlink_core::SyncOperationRepository;
use orderlink_domain::{OrderLinkError, Result as DomainResult, SyncOperation, SyncStatus};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;

use super::codec::{from_millis, opt_from_millis, opt_millis, parse_json, parse_text, to_millis, to_u32};
use super::manager::{map_join_error, DbManager};
use crate::errors::to_domain;

const SELECT_COLUMNS: &str = "id, connection_id, spreadsheet_id, operation_type, status,
    orders_processed, orders_created, orders_skipped, error_count, error_details,
    failure_reason, created_at, started_at, completed_at";

/// SQLite-backed [`SyncOperationRepository`].
///
/// `save` only touches rows that are not yet completed or failed, checked
/// in the same statement that writes.
pub struct SqliteSyncOperationRepository {
    db: Arc<DbManager>,
}

impl SqliteSyncOperationRepository {
    /// Repository over the shared pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncOperationRepository for SqliteSyncOperationRepository {
    async fn create(&self, operation: &SyncOperation) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let op = operation.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let details = serde_json::to_string(&op.error_details).map_err(to_domain)?;
            conn.execute(
                "INSERT INTO sync_operations (
                    id, connection_id, spreadsheet_id, operation_type, status,
                    orders_processed, orders_created, orders_skipped, error_count, error_details,
                    failure_reason, created_at, started_at, completed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    op.id,
                    op.connection_id,
                    op.spreadsheet_id,
                    op.operation_type.as_str(),
                    op.status.as_str(),
                    op.orders_processed,
                    op.orders_created,
                    op.orders_skipped,
                    op.error_count,
                    details,
                    op.failure_reason,
                    to_millis(op.created_at),
                    opt_millis(op.started_at),
                    opt_millis(op.completed_at),
                ],
            )
            .map_err(to_domain)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<SyncOperation>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<SyncOperation>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sync_operations WHERE id = ?1"),
                params![id],
                map_operation_row,
            )
            .optional()
            .map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn save(&self, operation: &SyncOperation) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let op = operation.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let details = serde_json::to_string(&op.error_details).map_err(to_domain)?;
            let changed = conn
                .execute(
                    "UPDATE sync_operations SET
                        status = ?2, orders_processed = ?3, orders_created = ?4,
                        orders_skipped = ?5, error_count = ?6, error_details = ?7,
                        failure_reason = ?8, started_at = ?9, completed_at = ?10
                     WHERE id = ?1 AND status NOT IN (?11, ?12)",
                    params![
                        op.id,
                        op.status.as_str(),
                        op.orders_processed,
                        op.orders_created,
                        op.orders_skipped,
                        op.error_count,
                        details,
                        op.failure_reason,
                        opt_millis(op.started_at),
                        opt_millis(op.completed_at),
                        SyncStatus::Completed.as_str(),
                        SyncStatus::Failed.as_str(),
                    ],
                )
                .map_err(to_domain)?;
            if changed > 0 {
                return Ok(());
            }

            let exists: Option<String> = conn
                .query_row("SELECT status FROM sync_operations WHERE id = ?1", params![op.id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(to_domain)?;
            match exists {
                Some(status) => Err(OrderLinkError::InvalidState(format!(
                    "sync operation {} is already {status}",
                    op.id
                ))),
                None => Err(OrderLinkError::NotFound(format!("sync operation {}", op.id))),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_by_connection(&self, connection_id: &str, limit: usize) -> DomainResult<Vec<SyncOperation>> {
        let db = Arc::clone(&self.db);
        let connection_id = connection_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        task::spawn_blocking(move || -> DomainResult<Vec<SyncOperation>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_operations
                     WHERE connection_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2"
                ))
                .map_err(to_domain)?;
            let rows = stmt.query_map(params![connection_id, limit], map_operation_row).map_err(to_domain)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_operation_row(row: &Row<'_>) -> rusqlite::Result<SyncOperation> {
    let operation_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    let details: String = row.get(9)?;

    Ok(SyncOperation {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        spreadsheet_id: row.get(2)?,
        operation_type: parse_text(3, &operation_type)?,
        status: parse_text(4, &status)?,
        orders_processed: to_u32(5, row.get(5)?)?,
        orders_created: to_u32(6, row.get(6)?)?,
        orders_skipped: to_u32(7, row.get(7)?)?,
        error_count: to_u32(8, row.get(8)?)?,
        error_details: parse_json(9, &details)?,
        failure_reason: row.get(10)?,
        created_at: from_millis(11, row.get(11)?)?,
        started_at: opt_from_millis(12, row.get(12)?)?,
        completed_at: opt_from_millis(13, row.get(13)?)?,
    })
}
