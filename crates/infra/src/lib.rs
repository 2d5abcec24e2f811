//! # OrderLink Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite persistence (connections, sync operations, orders)
//! - HTTP clients for OAuth token endpoints and the Google Sheets API
//! - The in-memory authorization state cache
//! - Configuration loading, tracing setup and the polling trigger
//!
//! ## Architecture
//! - Implements traits defined in `orderlink-core`
//! - Contains all I/O; core stays pure

pub mod bootstrap;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod observability;
pub mod scheduling;
pub mod sheets;

pub use bootstrap::{Adapters, OrderLink};
pub use database::{
    DbManager, SqliteConnectionRepository, SqliteOrderRepository, SqliteSyncOperationRepository,
};
pub use errors::InfraError;
pub use http::HttpClient;
pub use oauth::{HttpTokenEndpoint, MokaAuthStateStore};
pub use observability::init_tracing;
pub use scheduling::{PollingScheduler, PollingSchedulerConfig};
pub use sheets::GoogleSheetsClient;
