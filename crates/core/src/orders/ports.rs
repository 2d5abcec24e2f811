//! Port interface for order persistence

use async_trait::async_trait;
use chrono::NaiveDate;
use orderlink_domain::{Customer, Order, OrderActivity, OrderItem, OrderSource, Product, Result};

/// What happens to the customer record when an order is committed.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerChange {
    /// New customer for an unseen phone.
    Create(Customer),
    /// Existing customer with previously empty fields filled in.
    Backfill(Customer),
    /// Existing customer, written as-is.
    Unchanged(Customer),
}

impl CustomerChange {
    /// The customer the order will reference.
    #[must_use]
    pub fn customer(&self) -> &Customer {
        match self {
            Self::Create(customer) | Self::Backfill(customer) | Self::Unchanged(customer) => customer,
        }
    }
}

/// What happens to the product record when an order is committed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductChange {
    /// Product created from the row.
    Create(Product),
    /// Product matched by SKU or name.
    Existing(Product),
}

impl ProductChange {
    /// The product the line item will reference.
    #[must_use]
    pub fn product(&self) -> &Product {
        match self {
            Self::Create(product) | Self::Existing(product) => product,
        }
    }
}

/// Everything written for one sheet row, as a single unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializationPlan {
    /// Customer to create, backfill or reuse.
    pub customer: CustomerChange,
    /// Product to create or reuse.
    pub product: ProductChange,
    /// The order, with an empty `order_number`; the store assigns it.
    pub order: Order,
    /// The single line item.
    pub item: OrderItem,
    /// Creation entry for the order's activity log.
    pub activity: OrderActivity,
}

impl MaterializationPlan {
    /// Counter key for the order number: source prefix and the (UTC) day
    /// the order is created, not the date written in the sheet.
    #[must_use]
    pub fn numbering(&self) -> (OrderSource, NaiveDate) {
        (self.order.source, self.order.created_at.date_naive())
    }
}

/// Order, customer and product storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Customer of the organization with exactly this phone number.
    async fn find_customer_by_phone(&self, organization_id: &str, phone: &str) -> Result<Option<Customer>>;

    /// Product by SKU when given, otherwise (or when the SKU is unknown) by
    /// case-insensitive name.
    async fn find_product(&self, organization_id: &str, sku: Option<&str>, name: &str) -> Result<Option<Product>>;

    /// Apply the plan atomically: customer and product changes, the next
    /// order number for the organization and day, then order, item and
    /// activity. Nothing is written when any step fails.
    async fn commit(&self, plan: MaterializationPlan) -> Result<Order>;
}
