//! Domain types and models

pub mod connection;
pub mod order;
pub mod sheet;
pub mod sync;

pub use connection::{
    AuthorizationRequest, AuthorizationState, CompletedAuthorization, ConnectionOwner,
    ConnectionStatus, GoogleSheetsData, LinkedSpreadsheet, PlatformConnection, PlatformData,
    PlatformType, ShopifyData, TokenResponse, WebhookChannel, YouCanData,
};
pub use order::{
    Customer, DuplicateDetectionResult, DuplicateTier, DuplicateType, ExistingOrder, Order,
    OrderActivity, OrderItem, OrderSource, OrderStatus, Product, SheetOrder,
};
pub use sheet::{ColumnMapping, SheetConfig, SheetField, WebhookNotification};
pub use sync::{
    OperationType, SyncError, SyncErrorCategory, SyncOperation, SyncOptions, SyncReport,
    SyncStatus,
};
