//! Sheet rows, orders and duplicate detection results

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::ORDER_SEQUENCE_DIGITS;
use crate::types::connection::PlatformType;

/// Where an order came from; determines its number prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    /// Imported from a linked spreadsheet.
    GoogleSheets,
    /// Imported from a Shopify store.
    Shopify,
    /// Imported from a YouCan store.
    #[serde(rename = "youcan")]
    YouCan,
    /// Entered by hand.
    Manual,
}

crate::impl_domain_status_conversions!(OrderSource {
    GoogleSheets => "google_sheets",
    Shopify => "shopify",
    YouCan => "youcan",
    Manual => "manual",
});

impl OrderSource {
    /// Every source, in prefix lookup order.
    pub const ALL: [Self; 4] = [Self::GoogleSheets, Self::Shopify, Self::YouCan, Self::Manual];

    /// Two-letter order number prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::GoogleSheets => "GS",
            Self::Shopify => "SH",
            Self::YouCan => "YC",
            Self::Manual => "MN",
        }
    }

    /// `<prefix><YYYYMMDD>`, the part of an order number fixed for a day.
    #[must_use]
    pub fn day_prefix(self, date: NaiveDate) -> String {
        format!("{}{}", self.prefix(), date.format("%Y%m%d"))
    }

    /// Full order number: `<prefix><YYYYMMDD><NNNN>`.
    #[must_use]
    pub fn order_number(self, date: NaiveDate, sequence: u32) -> String {
        format!("{}{:0width$}", self.day_prefix(date), sequence, width = ORDER_SEQUENCE_DIGITS)
    }

    /// Whether `value` looks like a number this system generated: a known
    /// prefix followed by the day and at least four sequence digits (the
    /// sequence widens past 9999 orders a day).
    #[must_use]
    pub fn is_system_reference(value: &str) -> bool {
        let value = value.trim();
        Self::ALL.iter().any(|source| {
            value.strip_prefix(source.prefix()).is_some_and(|rest| {
                rest.len() >= 8 + ORDER_SEQUENCE_DIGITS && rest.bytes().all(|b| b.is_ascii_digit())
            })
        })
    }
}

impl From<PlatformType> for OrderSource {
    fn from(platform: PlatformType) -> Self {
        match platform {
            PlatformType::GoogleSheets => Self::GoogleSheets,
            PlatformType::Shopify => Self::Shopify,
            PlatformType::YouCan => Self::YouCan,
        }
    }
}

/// One parsed spreadsheet row. Transient; never stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetOrder {
    /// 1-based sheet row.
    pub row_number: u32,
    /// Order number already written to the row, if any.
    pub reference: Option<String>,
    /// Date from the sheet; today when the cell is blank.
    pub order_date: NaiveDate,
    /// Trimmed customer name.
    pub customer_name: String,
    /// Normalized phone.
    pub phone: String,
    /// Secondary phone, normalized.
    pub alt_phone: Option<String>,
    /// Customer email.
    pub email: Option<String>,
    /// Delivery address.
    pub address: String,
    /// Delivery city.
    pub city: String,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Product name as typed in the sheet.
    pub product_name: String,
    /// Product SKU, preferred over the name for lookups.
    pub product_sku: Option<String>,
    /// Units ordered; at least 1.
    pub quantity: u32,
    /// Free-form variant (size, colour).
    pub variant: Option<String>,
    /// Unit price; 0 when the cell is blank or unparseable.
    pub price: f64,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Status cell contents.
    pub status: Option<String>,
    /// Error cell contents.
    pub error: Option<String>,
}

impl SheetOrder {
    /// Whether the row already carries a system-generated order number.
    #[must_use]
    pub fn has_system_reference(&self) -> bool {
        self.reference.as_deref().is_some_and(OrderSource::is_system_reference)
    }

    /// First whitespace-separated token of the customer name.
    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        self.customer_name.split_whitespace().next()
    }
}

/// Customer, unique per organization and phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer id.
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Latest known name.
    pub name: String,
    /// Normalized phone; the lookup key.
    pub phone: String,
    /// Secondary phone.
    pub alt_phone: Option<String>,
    /// Email.
    pub email: Option<String>,
    /// Latest known address.
    pub address: Option<String>,
    /// Latest known city.
    pub city: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// First seen.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// Catalogue product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product id.
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Product name.
    pub name: String,
    /// SKU, unique per organization when present.
    pub sku: Option<String>,
    /// Catalogue price.
    pub price: f64,
    /// Units in stock.
    pub stock: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Confirmation-call status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting confirmation call.
    New,
    /// Confirmed by the customer.
    Confirmed,
    /// Cancelled before shipping.
    Cancelled,
    /// Handed to the carrier.
    Shipped,
    /// Delivered to the customer.
    Delivered,
    /// Sent back after shipping.
    Returned,
}

crate::impl_domain_status_conversions!(OrderStatus {
    New => "new",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Shipped => "shipped",
    Delivered => "delivered",
    Returned => "returned",
});

/// Stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id.
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// `<prefix><YYYYMMDD><NNNN>`, unique.
    pub order_number: String,
    /// Ordering customer.
    pub customer_id: String,
    /// Where the order came from.
    pub source: OrderSource,
    /// Confirmation status.
    pub status: OrderStatus,
    /// Date the customer placed the order.
    pub order_date: NaiveDate,
    /// Sum of item quantity times unit price.
    pub total_amount: f64,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Created despite a similar existing order.
    pub flagged: bool,
    /// Why the order was flagged.
    pub flag_note: Option<String>,
    /// Sync run that created the order.
    pub sync_operation_id: Option<String>,
    /// Spreadsheet the order was read from.
    pub spreadsheet_id: Option<String>,
    /// Row the order was read from.
    pub sheet_row: Option<u32>,
    /// Creation time; its UTC day is the day in the order number.
    pub created_at: DateTime<Utc>,
}

/// One product line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Item id.
    pub id: String,
    /// Owning order.
    pub order_id: String,
    /// Ordered product.
    pub product_id: String,
    /// Product name at order time.
    pub product_name: String,
    /// SKU at order time.
    pub sku: Option<String>,
    /// Variant text.
    pub variant: Option<String>,
    /// Units.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: f64,
}

/// Audit trail entry attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderActivity {
    /// Activity id.
    pub id: String,
    /// Order the entry belongs to.
    pub order_id: String,
    /// Short machine-readable kind (`created`, `flagged`).
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// Sync run that wrote the entry.
    pub sync_operation_id: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Flattened view of a stored order used for duplicate matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingOrder {
    /// Stored order id.
    pub order_id: String,
    /// Stored order number.
    pub order_number: String,
    /// Order date.
    pub order_date: NaiveDate,
    /// Customer name.
    pub customer_name: String,
    /// Normalized customer phone.
    pub phone: String,
    /// Customer address.
    pub address: Option<String>,
    /// Customer city.
    pub city: Option<String>,
    /// First item's product name.
    pub product_name: Option<String>,
    /// First item's SKU.
    pub product_sku: Option<String>,
    /// Order total.
    pub total_amount: f64,
    /// Order creation time.
    pub created_at: DateTime<Utc>,
}

/// Verdict of duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateType {
    /// Same order; the row is skipped.
    Exact,
    /// Close match; the order is created flagged.
    Similar,
    /// No match.
    None,
}

crate::impl_domain_status_conversions!(DuplicateType {
    Exact => "exact",
    Similar => "similar",
    None => "none",
});

/// Which detection strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateTier {
    /// Same phone on the same order date.
    SameDay,
    /// Same phone within the surrounding days.
    ExtendedWindow,
    /// Similar name and address on the same date.
    Fuzzy,
}

crate::impl_domain_status_conversions!(DuplicateTier {
    SameDay => "same_day",
    ExtendedWindow => "extended_window",
    Fuzzy => "fuzzy",
});

/// Result of checking a row against stored orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDetectionResult {
    /// `duplicate_type` is not `None`.
    pub is_duplicate: bool,
    /// Verdict.
    pub duplicate_type: DuplicateType,
    /// Best matching stored order.
    pub existing_order: Option<ExistingOrder>,
    /// In `[0, 1]`.
    pub similarity_score: f64,
    /// Fields that differ from the match.
    pub conflicting_fields: Vec<String>,
    /// Strategy that found the match.
    pub tier: Option<DuplicateTier>,
}

impl DuplicateDetectionResult {
    /// No match.
    #[must_use]
    pub fn none() -> Self {
        Self {
            is_duplicate: false,
            duplicate_type: DuplicateType::None,
            existing_order: None,
            similarity_score: 0.0,
            conflicting_fields: Vec::new(),
            tier: None,
        }
    }
}
