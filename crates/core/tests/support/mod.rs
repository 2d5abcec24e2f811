//! Shared test helpers for `orderlink-core` integration tests.
//!
//! In-memory implementations of every port plus fixtures for connections
//! and order sheets, so tests can focus on behaviour instead of wiring.

#![allow(dead_code)]

pub mod connections;
pub mod orders;
pub mod sheets;

use std::sync::Arc;

use chrono::{Duration, Utc};
use orderlink_common::crypto::TokenCipher;
use orderlink_core::{PlatformRegistry, SyncOrchestrator, SyncServices};
use orderlink_domain::{
    ColumnMapping, ConnectionStatus, GoogleSheetsData, LinkedSpreadsheet, OAuthPlatformConfig,
    OrderSource, PlatformConnection, PlatformData, PlatformType, SheetConfig, SheetField, SyncSettings,
    ValidationRules,
};

pub use connections::{InMemoryAuthStates, InMemoryConnections, ScriptedTokenEndpoint, StaticTokens};
pub use orders::{InMemoryOrders, InMemorySyncOperations};
pub use sheets::FakeSheets;

pub const ORG: &str = "org-1";
pub const SPREADSHEET: &str = "sheet-abc";
pub const HEADER: [&str; 10] =
    ["Date", "Name", "Phone", "Address", "City", "Product", "Price", "Qty", "Reference", "Error"];

pub fn cipher() -> Arc<TokenCipher> {
    Arc::new(TokenCipher::new(&[7u8; 32]).unwrap())
}

pub fn registry() -> PlatformRegistry {
    PlatformRegistry::default().with(OAuthPlatformConfig::google_sheets(
        "client-id".into(),
        "client-secret".into(),
        "https://app.example.com/callback".into(),
    ))
}

pub fn mapping() -> ColumnMapping {
    ColumnMapping::new()
        .with(SheetField::Date, "A")
        .with(SheetField::CustomerName, "B")
        .with(SheetField::Phone, "C")
        .with(SheetField::Address, "D")
        .with(SheetField::City, "E")
        .with(SheetField::ProductName, "F")
        .with(SheetField::Price, "G")
        .with(SheetField::Quantity, "H")
        .with(SheetField::Reference, "I")
        .with(SheetField::Error, "J")
}

/// Google Sheets order number assigned today for `sequence`.
pub fn todays_number(sequence: u32) -> String {
    OrderSource::GoogleSheets.order_number(Utc::now().date_naive(), sequence)
}

/// Active Google Sheets connection with `SPREADSHEET` linked.
pub fn connection(cipher: &TokenCipher, expires_in: Duration) -> PlatformConnection {
    let now = Utc::now();
    PlatformConnection {
        id: "conn-1".into(),
        platform: PlatformType::GoogleSheets,
        status: ConnectionStatus::Active,
        encrypted_access_token: Some(cipher.encrypt("access-0").unwrap()),
        encrypted_refresh_token: Some(cipher.encrypt("refresh-0").unwrap()),
        token_expires_at: Some(now + expires_in),
        scopes: vec!["https://www.googleapis.com/auth/spreadsheets".into()],
        owner_id: "user-1".into(),
        organization_id: ORG.into(),
        platform_data: PlatformData::GoogleSheets(GoogleSheetsData {
            account_email: None,
            spreadsheets: vec![LinkedSpreadsheet {
                spreadsheet_id: SPREADSHEET.into(),
                sheet: SheetConfig { mapping: mapping(), ..SheetConfig::default() },
                webhook_channel: None,
            }],
        }),
        last_error_at: None,
        last_error_message: None,
        sync_count: 0,
        last_sync_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Header row followed by the given data rows.
pub fn sheet(rows: Vec<Vec<&'static str>>) -> FakeSheets {
    let mut grid = vec![HEADER.to_vec()];
    grid.extend(rows);
    FakeSheets::new(grid)
}

fn leak(value: String) -> &'static str {
    Box::leak(value.into_boxed_str())
}

/// `count` valid rows, one per day, with distinct phones and names so no
/// row looks like a duplicate of another.
pub fn generated_rows(count: usize) -> Vec<Vec<&'static str>> {
    let first_day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..count)
        .map(|i| {
            let day = first_day + Duration::days(i as i64);
            vec![
                leak(day.format("%Y-%m-%d").to_string()),
                leak(format!("Client{i} Test")),
                leak(format!("06{:08}", 10_000_000 + i)),
                "1 Rue A",
                "Rabat",
                "Widget",
                "100",
                "1",
                "",
                "",
            ]
        })
        .collect()
}

pub fn fast_settings() -> SyncSettings {
    SyncSettings { inter_batch_delay_ms: 0, retry_base_delay_ms: 1, ..SyncSettings::default() }
}

/// Everything a sync test needs, wired together.
pub struct SyncHarness {
    pub connections: InMemoryConnections,
    pub operations: InMemorySyncOperations,
    pub orders: InMemoryOrders,
    pub sheets: FakeSheets,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl SyncHarness {
    pub fn new(sheets: FakeSheets) -> Self {
        Self::with_settings(sheets, fast_settings())
    }

    pub fn with_settings(sheets: FakeSheets, settings: SyncSettings) -> Self {
        let connections = InMemoryConnections::with(connection(&cipher(), Duration::hours(1)));
        Self::assemble(connections, InMemorySyncOperations::default(), InMemoryOrders::default(), sheets, &settings)
    }

    /// Same stores, different sheet contents.
    pub fn with_sheet(&self, sheets: FakeSheets) -> Self {
        Self::assemble(
            self.connections.clone(),
            self.operations.clone(),
            self.orders.clone(),
            sheets,
            &fast_settings(),
        )
    }

    fn assemble(
        connections: InMemoryConnections,
        operations: InMemorySyncOperations,
        orders: InMemoryOrders,
        sheets: FakeSheets,
        settings: &SyncSettings,
    ) -> Self {
        let services = SyncServices {
            connections: Arc::new(connections.clone()),
            tokens: Arc::new(StaticTokens("access-0")),
            operations: Arc::new(operations.clone()),
            sheets: Arc::new(sheets.clone()),
            order_lookup: Arc::new(orders.clone()),
            order_store: Arc::new(orders.clone()),
        };
        let orchestrator =
            Arc::new(SyncOrchestrator::new(services, settings, &ValidationRules::default()).unwrap());
        Self { connections, operations, orders, sheets, orchestrator }
    }
}
