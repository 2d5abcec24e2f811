//! Connection repository implementation
//!
//! Tokens are stored exactly as handed over: already sealed by the token
//! cipher. Platform metadata is kept as tagged JSON.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderlink_core::ConnectionRepository;
use orderlink_domain::{
    ConnectionStatus, OrderLinkError, PlatformConnection, PlatformType, Result as DomainResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;
use tracing::instrument;

use super::codec::{from_millis, opt_from_millis, opt_millis, parse_json, parse_text, to_millis};
use super::manager::{map_join_error, DbManager};
use crate::errors::to_domain;

const SELECT_COLUMNS: &str = "id, platform, status, encrypted_access_token, encrypted_refresh_token,
    token_expires_at, scopes, owner_id, organization_id, platform_data, last_error_at,
    last_error_message, sync_count, last_sync_at, created_at, updated_at";

/// SQLite-backed [`ConnectionRepository`].
pub struct SqliteConnectionRepository {
    db: Arc<DbManager>,
}

impl SqliteConnectionRepository {
    /// Repository over the shared pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConnectionRepository for SqliteConnectionRepository {
    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn insert(&self, connection: &PlatformConnection) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let connection = connection.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            insert_connection(&conn, &connection)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn update(&self, connection: &PlatformConnection) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let connection = connection.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let changed = update_connection(&conn, &connection)?;
            if changed == 0 {
                return Err(OrderLinkError::NotFound(format!("connection {}", connection.id)));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn update_credentials(&self, connection: &PlatformConnection) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let connection = connection.clone();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            if update_credentials(&conn, &connection)? > 0 {
                return Ok(true);
            }
            let exists: Option<String> = conn
                .query_row(
                    "SELECT status FROM platform_connections WHERE id = ?1",
                    params![connection.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(to_domain)?;
            match exists {
                Some(_) => Ok(false),
                None => Err(OrderLinkError::NotFound(format!("connection {}", connection.id))),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<PlatformConnection>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<PlatformConnection>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM platform_connections WHERE id = ?1"),
                params![id],
                map_connection_row,
            )
            .optional()
            .map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_by_organization(&self, organization_id: &str) -> DomainResult<Vec<PlatformConnection>> {
        let db = Arc::clone(&self.db);
        let organization_id = organization_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Vec<PlatformConnection>> {
            let conn = db.get_connection()?;
            query_connections(
                &conn,
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM platform_connections
                     WHERE organization_id = ?1 ORDER BY created_at, id"
                ),
                &organization_id,
            )
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_active(&self, platform: PlatformType) -> DomainResult<Vec<PlatformConnection>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<PlatformConnection>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM platform_connections
                     WHERE platform = ?1 AND status = ?2 ORDER BY created_at, id"
                ))
                .map_err(to_domain)?;
            let rows = stmt
                .query_map(params![platform.as_str(), ConnectionStatus::Active.as_str()], map_connection_row)
                .map_err(to_domain)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_sync(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE platform_connections
                     SET sync_count = sync_count + 1, last_sync_at = ?2, updated_at = ?2
                     WHERE id = ?1",
                    params![id, to_millis(at)],
                )
                .map_err(to_domain)?;
            if changed == 0 {
                return Err(OrderLinkError::NotFound(format!("connection {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

fn insert_connection(conn: &Connection, c: &PlatformConnection) -> DomainResult<()> {
    let scopes = serde_json::to_string(&c.scopes).map_err(to_domain)?;
    let platform_data = serde_json::to_string(&c.platform_data).map_err(to_domain)?;
    conn.execute(
        "INSERT INTO platform_connections (
            id, platform, status, encrypted_access_token, encrypted_refresh_token,
            token_expires_at, scopes, owner_id, organization_id, platform_data, last_error_at,
            last_error_message, sync_count, last_sync_at, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            c.id,
            c.platform.as_str(),
            c.status.as_str(),
            c.encrypted_access_token,
            c.encrypted_refresh_token,
            opt_millis(c.token_expires_at),
            scopes,
            c.owner_id,
            c.organization_id,
            platform_data,
            opt_millis(c.last_error_at),
            c.last_error_message,
            c.sync_count,
            opt_millis(c.last_sync_at),
            to_millis(c.created_at),
            to_millis(c.updated_at),
        ],
    )
    .map_err(to_domain)?;
    Ok(())
}

fn update_connection(conn: &Connection, c: &PlatformConnection) -> DomainResult<usize> {
    let scopes = serde_json::to_string(&c.scopes).map_err(to_domain)?;
    let platform_data = serde_json::to_string(&c.platform_data).map_err(to_domain)?;
    conn.execute(
        "UPDATE platform_connections SET
            status = ?2, encrypted_access_token = ?3, encrypted_refresh_token = ?4,
            token_expires_at = ?5, scopes = ?6, platform_data = ?7, last_error_at = ?8,
            last_error_message = ?9, sync_count = ?10, last_sync_at = ?11, updated_at = ?12
         WHERE id = ?1",
        params![
            c.id,
            c.status.as_str(),
            c.encrypted_access_token,
            c.encrypted_refresh_token,
            opt_millis(c.token_expires_at),
            scopes,
            platform_data,
            opt_millis(c.last_error_at),
            c.last_error_message,
            c.sync_count,
            opt_millis(c.last_sync_at),
            to_millis(c.updated_at),
        ],
    )
    .map_err(to_domain)
}

/// Credential columns only, guarded by the status check in the same statement.
fn update_credentials(conn: &Connection, c: &PlatformConnection) -> DomainResult<usize> {
    let scopes = serde_json::to_string(&c.scopes).map_err(to_domain)?;
    conn.execute(
        "UPDATE platform_connections SET
            status = ?2, encrypted_access_token = ?3, encrypted_refresh_token = ?4,
            token_expires_at = ?5, scopes = ?6, last_error_at = ?7, last_error_message = ?8,
            updated_at = ?9
         WHERE id = ?1 AND status != ?10",
        params![
            c.id,
            c.status.as_str(),
            c.encrypted_access_token,
            c.encrypted_refresh_token,
            opt_millis(c.token_expires_at),
            scopes,
            opt_millis(c.last_error_at),
            c.last_error_message,
            to_millis(c.updated_at),
            ConnectionStatus::Revoked.as_str(),
        ],
    )
    .map_err(to_domain)
}

fn query_connections(conn: &Connection, sql: &str, key: &str) -> DomainResult<Vec<PlatformConnection>> {
    let mut stmt = conn.prepare(sql).map_err(to_domain)?;
    let rows = stmt.query_map(params![key], map_connection_row).map_err(to_domain)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(to_domain)
}

fn map_connection_row(row: &Row<'_>) -> rusqlite::Result<PlatformConnection> {
    let platform: String = row.get(1)?;
    let status: String = row.get(2)?;
    let scopes: String = row.get(6)?;
    let platform_data: String = row.get(9)?;

    Ok(PlatformConnection {
        id: row.get(0)?,
        platform: parse_text(1, &platform)?,
        status: parse_text(2, &status)?,
        encrypted_access_token: row.get(3)?,
        encrypted_refresh_token: row.get(4)?,
        token_expires_at: opt_from_millis(5, row.get(5)?)?,
        scopes: parse_json(6, &scopes)?,
        owner_id: row.get(7)?,
        organization_id: row.get(8)?,
        platform_data: parse_json(9, &platform_data)?,
        last_error_at: opt_from_millis(10, row.get(10)?)?,
        last_error_message: row.get(11)?,
        sync_count: row.get(12)?,
        last_sync_at: opt_from_millis(13, row.get(13)?)?,
        created_at: from_millis(14, row.get(14)?)?,
        updated_at: from_millis(15, row.get(15)?)?,
    })
}
