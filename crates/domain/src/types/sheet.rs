//! Spreadsheet layout configuration and provider notifications

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order fields a sheet column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetField {
    /// Order number written back by the system.
    Reference,
    /// Order date.
    Date,
    /// Customer name.
    CustomerName,
    /// Primary phone.
    Phone,
    /// Secondary phone.
    AltPhone,
    /// Email.
    Email,
    /// Delivery address.
    Address,
    /// Delivery city.
    City,
    /// Postal code.
    PostalCode,
    /// Product name.
    ProductName,
    /// Product SKU.
    ProductSku,
    /// Units ordered.
    Quantity,
    /// Variant text.
    Variant,
    /// Unit price.
    Price,
    /// Free-form notes.
    Notes,
    /// Import status written back by the system.
    Status,
    /// Import error written back by the system.
    Error,
}

crate::impl_domain_status_conversions!(SheetField {
    Reference => "reference",
    Date => "date",
    CustomerName => "customer_name",
    Phone => "phone",
    AltPhone => "alt_phone",
    Email => "email",
    Address => "address",
    City => "city",
    PostalCode => "postal_code",
    ProductName => "product_name",
    ProductSku => "product_sku",
    Quantity => "quantity",
    Variant => "variant",
    Price => "price",
    Notes => "notes",
    Status => "status",
    Error => "error",
});

/// Field to column-letter mapping (`Phone -> "C"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(BTreeMap<SheetField, String>);

impl ColumnMapping {
    /// Empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; column letters are stored uppercase.
    #[must_use]
    pub fn with(mut self, field: SheetField, column: &str) -> Self {
        self.set(field, column);
        self
    }

    /// Map `field` to `column`, replacing any earlier column.
    pub fn set(&mut self, field: SheetField, column: &str) {
        self.0.insert(field, column.trim().to_ascii_uppercase());
    }

    /// Column mapped to `field`.
    #[must_use]
    pub fn column_for(&self, field: SheetField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    /// No field is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mapped fields in field order.
    pub fn iter(&self) -> impl Iterator<Item = (SheetField, &str)> {
        self.0.iter().map(|(field, column)| (*field, column.as_str()))
    }
}

impl FromIterator<(SheetField, String)> for ColumnMapping {
    fn from_iter<I: IntoIterator<Item = (SheetField, String)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (field, column) in iter {
            mapping.set(field, &column);
        }
        mapping
    }
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

const fn default_header_row() -> u32 {
    1
}

const fn default_data_start_row() -> u32 {
    2
}

/// Where orders live inside a spreadsheet and how columns map to fields.
///
/// Rows are 1-based, as shown in the spreadsheet UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Tab name.
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    /// Row holding the headers, 1-based.
    #[serde(default = "default_header_row")]
    pub header_row: u32,
    /// First data row, 1-based.
    #[serde(default = "default_data_start_row")]
    pub data_start_row: u32,
    /// Field to column mapping.
    #[serde(default)]
    pub mapping: ColumnMapping,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            sheet_name: default_sheet_name(),
            header_row: default_header_row(),
            data_start_row: default_data_start_row(),
            mapping: ColumnMapping::default(),
        }
    }
}

/// Push notification sent by the spreadsheet provider when a watched file
/// changes. Carries no row data.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookNotification {
    /// Resource kind, `api#channel`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Channel id chosen when the watch was registered.
    pub id: String,
    /// Provider id of the watched resource.
    #[serde(default)]
    pub resource_id: Option<String>,
    /// URI of the watched resource.
    #[serde(default)]
    pub resource_uri: Option<String>,
    /// `sync` on registration, `update` and friends afterwards.
    pub resource_state: String,
    /// Kind of change, when reported.
    #[serde(default)]
    pub event_type: Option<String>,
    /// When the change happened.
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    /// Channel token; must match the registered one.
    #[serde(default)]
    pub token: Option<String>,
    /// Channel expiry.
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for WebhookNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotification")
            .field("id", &self.id)
            .field("resource_id", &self.resource_id)
            .field("resource_state", &self.resource_state)
            .field("event_type", &self.event_type)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl WebhookNotification {
    /// The handshake sent right after a channel is created.
    #[must_use]
    pub fn is_sync_handshake(&self) -> bool {
        self.resource_state.eq_ignore_ascii_case("sync")
    }
}
