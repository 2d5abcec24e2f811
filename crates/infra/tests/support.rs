//! Shared fixtures for infra integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use orderlink_core::orders::ports::{CustomerChange, MaterializationPlan, ProductChange};
use orderlink_core::AccessTokenProvider;
use orderlink_domain::{
    ColumnMapping, ConnectionStatus, Customer, GoogleSheetsData, LinkedSpreadsheet, Order,
    OrderActivity, OrderItem, OrderSource, OrderStatus, PlatformConnection, PlatformData,
    PlatformType, Product, Result, SheetConfig, SheetField,
};
use orderlink_infra::database::DbManager;
use tempfile::TempDir;

/// Temporary database with the schema applied. The file lives as long as
/// the harness.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("orderlink-test.db");

        let manager = DbManager::new(&db_path, 4, Duration::from_secs(5))
            .expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().expect("valid timestamp")
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Columns A..K: date, name, phone, address, city, product, quantity,
/// price, reference, status, error.
pub fn standard_mapping() -> ColumnMapping {
    ColumnMapping::new()
        .with(SheetField::Date, "A")
        .with(SheetField::CustomerName, "B")
        .with(SheetField::Phone, "C")
        .with(SheetField::Address, "D")
        .with(SheetField::City, "E")
        .with(SheetField::ProductName, "F")
        .with(SheetField::Quantity, "G")
        .with(SheetField::Price, "H")
        .with(SheetField::Reference, "I")
        .with(SheetField::Status, "J")
        .with(SheetField::Error, "K")
}

pub fn linked(spreadsheet_id: &str) -> LinkedSpreadsheet {
    LinkedSpreadsheet {
        spreadsheet_id: spreadsheet_id.to_string(),
        sheet: SheetConfig {
            sheet_name: "Orders".to_string(),
            header_row: 1,
            data_start_row: 2,
            mapping: standard_mapping(),
        },
        webhook_channel: None,
    }
}

/// Active Google Sheets connection linking `spreadsheets`.
pub fn connection(id: &str, organization_id: &str, spreadsheets: Vec<LinkedSpreadsheet>) -> PlatformConnection {
    let created = at(2024, 1, 2, 9);
    PlatformConnection {
        id: id.to_string(),
        platform: PlatformType::GoogleSheets,
        status: ConnectionStatus::Active,
        encrypted_access_token: Some("v1.bm9uY2U.Y2lwaGVy".to_string()),
        encrypted_refresh_token: Some("v1.bm9uY2U.cmVmcmVzaA".to_string()),
        token_expires_at: Some(at(2024, 1, 2, 10)),
        scopes: vec!["https://www.googleapis.com/auth/spreadsheets".to_string()],
        owner_id: "user-1".to_string(),
        organization_id: organization_id.to_string(),
        platform_data: PlatformData::GoogleSheets(GoogleSheetsData {
            account_email: Some("shop@example.com".to_string()),
            spreadsheets,
        }),
        last_error_at: None,
        last_error_message: None,
        sync_count: 0,
        last_sync_at: None,
        created_at: created,
        updated_at: created,
    }
}

/// Google Sheets order number assigned today for `sequence`.
pub fn todays_number(sequence: u32) -> String {
    OrderSource::GoogleSheets.order_number(Utc::now().date_naive(), sequence)
}

/// Orders in these fixtures are created on the day they are dated.
fn created_day_noon(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(12, 0, 0).unwrap().and_utc()
}

/// A plan creating a fresh customer and product for one order line.
pub fn new_order_plan(
    organization_id: &str,
    phone: &str,
    name: &str,
    address: &str,
    order_date: NaiveDate,
) -> MaterializationPlan {
    let now = Utc::now();
    let customer = Customer {
        id: uuid::Uuid::new_v4().to_string(),
        organization_id: organization_id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        alt_phone: None,
        email: None,
        address: Some(address.to_string()),
        city: Some("Casablanca".to_string()),
        postal_code: None,
        created_at: now,
        updated_at: now,
    };
    let product = Product {
        id: uuid::Uuid::new_v4().to_string(),
        organization_id: organization_id.to_string(),
        name: "Argan Oil 100ml".to_string(),
        sku: Some("ARG-100".to_string()),
        price: 120.0,
        stock: 100,
        created_at: now,
    };
    let order_id = uuid::Uuid::new_v4().to_string();
    let order = Order {
        id: order_id.clone(),
        organization_id: organization_id.to_string(),
        order_number: String::new(),
        customer_id: customer.id.clone(),
        source: OrderSource::GoogleSheets,
        status: OrderStatus::New,
        order_date,
        total_amount: 240.0,
        notes: None,
        flagged: false,
        flag_note: None,
        sync_operation_id: Some("op-1".to_string()),
        spreadsheet_id: Some("sheet-1".to_string()),
        sheet_row: Some(2),
        created_at: created_day_noon(order_date),
    };
    let item = OrderItem {
        id: uuid::Uuid::new_v4().to_string(),
        order_id: order_id.clone(),
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        sku: product.sku.clone(),
        variant: None,
        quantity: 2,
        unit_price: 120.0,
    };
    let activity = OrderActivity {
        id: uuid::Uuid::new_v4().to_string(),
        order_id,
        kind: "created".to_string(),
        message: "Imported from Google Sheets row 2".to_string(),
        sync_operation_id: Some("op-1".to_string()),
        created_at: now,
    };
    MaterializationPlan {
        customer: CustomerChange::Create(customer),
        product: ProductChange::Create(product),
        order,
        item,
        activity,
    }
}

/// Hands out the same access token for every connection.
pub struct StaticTokens(pub &'static str);

#[async_trait]
impl AccessTokenProvider for StaticTokens {
    async fn access_token(&self, _connection_id: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}
