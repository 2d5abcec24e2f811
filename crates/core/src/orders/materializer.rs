//! Order materializer
//!
//! Turns a validated, non-duplicate sheet row into a customer (reused by
//! phone, backfilled but never overwritten), a product (found by SKU or
//! name, created otherwise) and an order with one line item and an activity
//! entry. The write is handed to the store as one plan.

use std::sync::Arc;

use chrono::Utc;
use orderlink_domain::constants::DEFAULT_PRODUCT_STOCK;
use orderlink_domain::{
    Customer, Order, OrderActivity, OrderItem, OrderLinkError, OrderSource, OrderStatus, Product, SheetOrder,
};
use thiserror::Error;
use tracing::{info, instrument};

use super::ports::{CustomerChange, MaterializationPlan, OrderStore, ProductChange};
use crate::duplicates::scoring::row_total;
use crate::utils::text::non_blank;

/// Which step of materialization failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MaterializeError {
    /// Customer lookup or creation failed.
    #[error("customer creation failed: {0}")]
    Customer(OrderLinkError),

    /// Product lookup failed.
    #[error("product not found and could not be created: {0}")]
    Product(OrderLinkError),

    /// The atomic commit failed; nothing was written.
    #[error("order commit failed: {0}")]
    Commit(OrderLinkError),
}

impl MaterializeError {
    /// The underlying store error.
    #[must_use]
    pub fn cause(&self) -> &OrderLinkError {
        match self {
            Self::Customer(err) | Self::Product(err) | Self::Commit(err) => err,
        }
    }
}

/// Where the rows being materialized come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderContext {
    /// Organization owning the orders.
    pub organization_id: String,
    /// Operation the orders are attributed to.
    pub sync_operation_id: String,
    /// Source spreadsheet.
    pub spreadsheet_id: String,
    /// Order-number prefix.
    pub source: OrderSource,
}

fn fill(slot: &mut Option<String>, value: Option<&str>) -> bool {
    match (slot.as_deref().and_then(non_blank), value.and_then(non_blank)) {
        (None, Some(value)) => {
            *slot = Some(value.to_string());
            true
        }
        _ => false,
    }
}

/// Fill the customer's empty fields from the row. Returns whether anything
/// changed.
fn backfill(customer: &mut Customer, row: &SheetOrder) -> bool {
    let mut changed = false;
    if customer.name.trim().is_empty() && !row.customer_name.trim().is_empty() {
        customer.name = row.customer_name.trim().to_string();
        changed = true;
    }
    changed |= fill(&mut customer.alt_phone, row.alt_phone.as_deref());
    changed |= fill(&mut customer.email, row.email.as_deref());
    changed |= fill(&mut customer.address, Some(&row.address));
    changed |= fill(&mut customer.city, Some(&row.city));
    changed |= fill(&mut customer.postal_code, row.postal_code.as_deref());
    changed
}

/// Creates orders from sheet rows.
pub struct OrderMaterializer {
    store: Arc<dyn OrderStore>,
    default_stock: i64,
}

impl OrderMaterializer {
    /// Materializer over `store`.
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store, default_stock: DEFAULT_PRODUCT_STOCK }
    }

    /// Stock level given to products created from a sheet.
    #[must_use]
    pub fn with_default_stock(mut self, stock: i64) -> Self {
        self.default_stock = stock;
        self
    }

    async fn customer_change(&self, context: &OrderContext, row: &SheetOrder) -> Result<CustomerChange, MaterializeError> {
        let existing = self
            .store
            .find_customer_by_phone(&context.organization_id, &row.phone)
            .await
            .map_err(MaterializeError::Customer)?;

        let now = Utc::now();
        Ok(match existing {
            Some(mut customer) => {
                if backfill(&mut customer, row) {
                    customer.updated_at = now;
                    CustomerChange::Backfill(customer)
                } else {
                    CustomerChange::Unchanged(customer)
                }
            }
            None => CustomerChange::Create(Customer {
                id: uuid::Uuid::new_v4().to_string(),
                organization_id: context.organization_id.clone(),
                name: row.customer_name.trim().to_string(),
                phone: row.phone.clone(),
                alt_phone: row.alt_phone.clone(),
                email: row.email.clone(),
                address: non_blank(&row.address).map(str::to_string),
                city: non_blank(&row.city).map(str::to_string),
                postal_code: row.postal_code.clone(),
                created_at: now,
                updated_at: now,
            }),
        })
    }

    async fn product_change(&self, context: &OrderContext, row: &SheetOrder) -> Result<ProductChange, MaterializeError> {
        let existing = self
            .store
            .find_product(&context.organization_id, row.product_sku.as_deref(), row.product_name.trim())
            .await
            .map_err(MaterializeError::Product)?;

        Ok(match existing {
            Some(product) => ProductChange::Existing(product),
            None => ProductChange::Create(Product {
                id: uuid::Uuid::new_v4().to_string(),
                organization_id: context.organization_id.clone(),
                name: row.product_name.trim().to_string(),
                sku: row.product_sku.clone(),
                price: row.price,
                stock: self.default_stock,
                created_at: Utc::now(),
            }),
        })
    }

    /// Build and commit the plan for `row`. A `flag_note` marks the order
    /// for review.
    #[instrument(skip(self, context, row, flag_note), fields(row = row.row_number, flagged = flag_note.is_some()))]
    pub async fn materialize(
        &self,
        context: &OrderContext,
        row: &SheetOrder,
        flag_note: Option<String>,
    ) -> Result<Order, MaterializeError> {
        let customer = self.customer_change(context, row).await?;
        let product = self.product_change(context, row).await?;
        let now = Utc::now();
        let order_id = uuid::Uuid::new_v4().to_string();

        let mut message = format!("Imported from spreadsheet {} row {}", context.spreadsheet_id, row.row_number);
        if let Some(note) = &flag_note {
            message.push_str(": ");
            message.push_str(note);
        }

        let plan = MaterializationPlan {
            item: OrderItem {
                id: uuid::Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                product_id: product.product().id.clone(),
                product_name: product.product().name.clone(),
                sku: row.product_sku.clone().or_else(|| product.product().sku.clone()),
                variant: row.variant.clone(),
                quantity: row.quantity.max(1),
                unit_price: row.price,
            },
            activity: OrderActivity {
                id: uuid::Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                kind: if flag_note.is_some() { "imported_flagged" } else { "imported" }.to_string(),
                message,
                sync_operation_id: Some(context.sync_operation_id.clone()),
                created_at: now,
            },
            order: Order {
                id: order_id,
                organization_id: context.organization_id.clone(),
                order_number: String::new(),
                customer_id: customer.customer().id.clone(),
                source: context.source,
                status: OrderStatus::New,
                order_date: row.order_date,
                total_amount: row_total(row),
                notes: row.notes.clone(),
                flagged: flag_note.is_some(),
                flag_note,
                sync_operation_id: Some(context.sync_operation_id.clone()),
                spreadsheet_id: Some(context.spreadsheet_id.clone()),
                sheet_row: Some(row.row_number),
                created_at: now,
            },
            customer,
            product,
        };

        let order = self.store.commit(plan).await.map_err(MaterializeError::Commit)?;
        info!(order_number = %order.order_number, order_id = %order.id, "Order created from sheet row");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn row() -> SheetOrder {
        SheetOrder {
            row_number: 7,
            reference: None,
            order_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            customer_name: "Ahmed Ali".into(),
            phone: "0612345678".into(),
            alt_phone: Some("0700000000".into()),
            email: None,
            address: "12 Rue X".into(),
            city: "Casablanca".into(),
            postal_code: None,
            product_name: "Widget".into(),
            product_sku: None,
            quantity: 2,
            variant: None,
            price: 50.0,
            notes: None,
            status: None,
            error: None,
        }
    }

    fn customer() -> Customer {
        Customer {
            id: "c1".into(),
            organization_id: "org".into(),
            name: "Ahmed".into(),
            phone: "0612345678".into(),
            alt_phone: None,
            email: Some("a@example.com".into()),
            address: Some("Old address".into()),
            city: None,
            postal_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn backfill_only_fills_empty_fields() {
        let mut existing = customer();
        assert!(backfill(&mut existing, &row()));
        assert_eq!(existing.name, "Ahmed");
        assert_eq!(existing.address.as_deref(), Some("Old address"));
        assert_eq!(existing.email.as_deref(), Some("a@example.com"));
        assert_eq!(existing.city.as_deref(), Some("Casablanca"));
        assert_eq!(existing.alt_phone.as_deref(), Some("0700000000"));
        assert!(!backfill(&mut existing, &row()));
    }
}
