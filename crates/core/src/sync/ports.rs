//! Port interfaces for sync bookkeeping and token access

use async_trait::async_trait;
use orderlink_domain::{Result, SyncOperation};

/// Persistence for [`SyncOperation`] records.
#[async_trait]
pub trait SyncOperationRepository: Send + Sync {
    /// Insert a new operation.
    async fn create(&self, operation: &SyncOperation) -> Result<()>;

    /// Look up one operation.
    async fn find_by_id(&self, id: &str) -> Result<Option<SyncOperation>>;

    /// Persist status and counters. Fails with `InvalidState` when the
    /// stored record is already completed or failed.
    async fn save(&self, operation: &SyncOperation) -> Result<()>;

    /// Most recent operations of a connection first.
    async fn list_by_connection(&self, connection_id: &str, limit: usize) -> Result<Vec<SyncOperation>>;
}

/// Source of a usable access token for a connection.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Plaintext access token, refreshed first if needed.
    async fn access_token(&self, connection_id: &str) -> Result<String>;
}
