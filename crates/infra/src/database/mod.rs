//! SQLite persistence for connections, sync operations and orders

mod codec;
pub mod connection_repository;
pub mod manager;
pub mod order_repository;
pub mod sync_operation_repository;

pub use connection_repository::SqliteConnectionRepository;
pub use manager::{DbConnection, DbManager};
pub use order_repository::SqliteOrderRepository;
pub use sync_operation_repository::SqliteSyncOperationRepository;
