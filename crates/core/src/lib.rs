//! # OrderLink Core
//!
//! Business logic for external connections and spreadsheet order
//! synchronization. No infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for storage, token endpoints and sheet access
//! - The connection lifecycle manager (OAuth, refresh, revocation)
//! - Sheet reading, duplicate detection and order materialization
//! - The batch sync orchestrator and its webhook trigger
//!
//! ## Architecture Principles
//! - Depends only on `orderlink-common` and `orderlink-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod connections;
pub mod duplicates;
pub mod orders;
pub mod sheets;
pub mod sync;
pub mod utils;

// Re-export specific items to avoid ambiguity
pub use connections::ports::{AuthStateStore, ConnectionRepository, TokenEndpoint, TokenEndpointError};
pub use connections::{ConnectionLifecycleManager, LifecycleSettings, PlatformRegistry};
pub use duplicates::ports::OrderLookup;
pub use duplicates::{DuplicateDetector, DuplicateResolution};
pub use orders::ports::OrderStore;
pub use orders::{OrderContext, OrderMaterializer};
pub use sheets::ports::{SheetsClient, SheetsError};
pub use sheets::SheetReader;
pub use sync::ports::{AccessTokenProvider, SyncOperationRepository};
pub use sync::{RowOutcome, RowValidator, SyncOrchestrator, SyncServices, WebhookHandler, WebhookOutcome};
