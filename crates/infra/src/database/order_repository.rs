//! Order, customer and product repository implementation
//!
//! Serves both the duplicate detector (read side) and the materializer
//! (atomic commit). Order numbers are allocated from `order_sequences`
//! inside the commit transaction, so concurrent rows never share one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use orderlink_core::orders::ports::{CustomerChange, MaterializationPlan, ProductChange};
use orderlink_core::{OrderLookup, OrderStore};
use orderlink_domain::{
    Customer, ExistingOrder, Order, OrderActivity, OrderItem, OrderLinkError, Product,
    Result as DomainResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::task;
use tracing::{debug, instrument};

use super::codec::{day_text, from_millis, like_escape, parse_day, parse_text, to_millis};
use super::manager::{map_join_error, DbManager};
use crate::errors::to_domain;

/// Orders joined with their customer and first line item.
const EXISTING_ORDER_SELECT: &str = "SELECT o.id, o.order_number, o.order_date, c.name, c.phone,
        c.address, c.city, i.product_name, i.sku, o.total_amount, o.created_at
    FROM orders o
    JOIN customers c ON c.id = o.customer_id
    LEFT JOIN order_items i ON i.rowid = (
        SELECT MIN(rowid) FROM order_items WHERE order_id = o.id
    )";

const CUSTOMER_COLUMNS: &str = "id, organization_id, name, phone, alt_phone, email, address, city,
    postal_code, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, organization_id, name, sku, price, stock, created_at";

/// SQLite-backed [`OrderLookup`] and [`OrderStore`].
pub struct SqliteOrderRepository {
    db: Arc<DbManager>,
}

impl SqliteOrderRepository {
    /// Repository over the shared pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Order by its number, for callers outside the sync path.
    pub async fn find_order_by_number(&self, organization_id: &str, order_number: &str) -> DomainResult<Option<Order>> {
        let db = Arc::clone(&self.db);
        let organization_id = organization_id.to_string();
        let order_number = order_number.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Order>> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT id, organization_id, order_number, customer_id, source, status, order_date,
                        total_amount, notes, flagged, flag_note, sync_operation_id, spreadsheet_id,
                        sheet_row, created_at
                 FROM orders WHERE organization_id = ?1 AND order_number = ?2",
                params![organization_id, order_number],
                map_order_row,
            )
            .optional()
            .map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Items of one order in insertion order.
    pub async fn list_items(&self, order_id: &str) -> DomainResult<Vec<OrderItem>> {
        let db = Arc::clone(&self.db);
        let order_id = order_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Vec<OrderItem>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, order_id, product_id, product_name, sku, variant, quantity, unit_price
                     FROM order_items WHERE order_id = ?1 ORDER BY rowid",
                )
                .map_err(to_domain)?;
            let rows = stmt
                .query_map(params![order_id], |row| {
                    Ok(OrderItem {
                        id: row.get(0)?,
                        order_id: row.get(1)?,
                        product_id: row.get(2)?,
                        product_name: row.get(3)?,
                        sku: row.get(4)?,
                        variant: row.get(5)?,
                        quantity: row.get(6)?,
                        unit_price: row.get(7)?,
                    })
                })
                .map_err(to_domain)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Audit entries of one order, oldest first.
    pub async fn list_activities(&self, order_id: &str) -> DomainResult<Vec<OrderActivity>> {
        let db = Arc::clone(&self.db);
        let order_id = order_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Vec<OrderActivity>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, order_id, kind, message, sync_operation_id, created_at
                     FROM order_activities WHERE order_id = ?1 ORDER BY created_at, rowid",
                )
                .map_err(to_domain)?;
            let rows = stmt
                .query_map(params![order_id], |row| {
                    Ok(OrderActivity {
                        id: row.get(0)?,
                        order_id: row.get(1)?,
                        kind: row.get(2)?,
                        message: row.get(3)?,
                        sync_operation_id: row.get(4)?,
                        created_at: from_millis(5, row.get(5)?)?,
                    })
                })
                .map_err(to_domain)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl OrderLookup for SqliteOrderRepository {
    async fn find_by_phone_between(
        &self,
        organization_id: &str,
        phone: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> DomainResult<Vec<ExistingOrder>> {
        let db = Arc::clone(&self.db);
        let organization_id = organization_id.to_string();
        let phone = phone.to_string();
        let limit = sql_limit(limit);

        task::spawn_blocking(move || -> DomainResult<Vec<ExistingOrder>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "{EXISTING_ORDER_SELECT}
                     WHERE o.organization_id = ?1 AND c.phone = ?2
                       AND o.order_date BETWEEN ?3 AND ?4
                     ORDER BY o.order_date DESC, o.created_at DESC
                     LIMIT ?5"
                ))
                .map_err(to_domain)?;
            let rows = stmt
                .query_map(
                    params![organization_id, phone, day_text(from), day_text(to), limit],
                    map_existing_order_row,
                )
                .map_err(to_domain)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_same_day_candidates(
        &self,
        organization_id: &str,
        date: NaiveDate,
        first_name: Option<&str>,
        address_prefix: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<ExistingOrder>> {
        if first_name.is_none() && address_prefix.is_none() {
            return Ok(Vec::new());
        }
        let db = Arc::clone(&self.db);
        let organization_id = organization_id.to_string();
        let name_pattern = first_name.map(|name| format!("%{}%", like_escape(name)));
        let address_pattern = address_prefix.map(|prefix| format!("{}%", like_escape(prefix)));
        let limit = sql_limit(limit);

        task::spawn_blocking(move || -> DomainResult<Vec<ExistingOrder>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "{EXISTING_ORDER_SELECT}
                     WHERE o.organization_id = ?1 AND o.order_date = ?2
                       AND ((?3 IS NOT NULL AND c.name LIKE ?3 ESCAPE '\\')
                         OR (?4 IS NOT NULL AND c.address LIKE ?4 ESCAPE '\\'))
                     ORDER BY o.created_at DESC
                     LIMIT ?5"
                ))
                .map_err(to_domain)?;
            let rows = stmt
                .query_map(
                    params![organization_id, day_text(date), name_pattern, address_pattern, limit],
                    map_existing_order_row,
                )
                .map_err(to_domain)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl OrderStore for SqliteOrderRepository {
    async fn find_customer_by_phone(&self, organization_id: &str, phone: &str) -> DomainResult<Option<Customer>> {
        let db = Arc::clone(&self.db);
        let organization_id = organization_id.to_string();
        let phone = phone.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Customer>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE organization_id = ?1 AND phone = ?2"),
                params![organization_id, phone],
                map_customer_row,
            )
            .optional()
            .map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_product(&self, organization_id: &str, sku: Option<&str>, name: &str) -> DomainResult<Option<Product>> {
        let db = Arc::clone(&self.db);
        let organization_id = organization_id.to_string();
        let sku = sku.map(str::to_string);
        let name = name.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Product>> {
            let conn = db.get_connection()?;
            if let Some(sku) = sku {
                let by_sku = conn
                    .query_row(
                        &format!(
                            "SELECT {PRODUCT_COLUMNS} FROM products
                             WHERE organization_id = ?1 AND sku = ?2 ORDER BY created_at LIMIT 1"
                        ),
                        params![organization_id, sku],
                        map_product_row,
                    )
                    .optional()
                    .map_err(to_domain)?;
                if by_sku.is_some() {
                    return Ok(by_sku);
                }
            }
            conn.query_row(
                &format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products
                     WHERE organization_id = ?1 AND name = ?2 COLLATE NOCASE
                     ORDER BY created_at LIMIT 1"
                ),
                params![organization_id, name],
                map_product_row,
            )
            .optional()
            .map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, plan), fields(order_id = %plan.order.id, row = ?plan.order.sheet_row))]
    async fn commit(&self, plan: MaterializationPlan) -> DomainResult<Order> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Order> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(to_domain)?;
            let order = commit_plan(&tx, plan)?;
            tx.commit().map_err(to_domain)?;
            debug!(order_number = %order.order_number, "Order committed");
            Ok(order)
        })
        .await
        .map_err(map_join_error)?
    }
}

/// Every write of one materialization. Runs inside the caller's
/// transaction; any error rolls the whole plan back.
fn commit_plan(conn: &Connection, plan: MaterializationPlan) -> DomainResult<Order> {
    let (source, day) = plan.numbering();
    let MaterializationPlan { customer, product, mut order, mut item, activity } = plan;

    order.customer_id = match customer {
        CustomerChange::Create(customer) => insert_customer(conn, &customer)?,
        CustomerChange::Backfill(customer) => {
            update_customer(conn, &customer)?;
            customer.id
        }
        CustomerChange::Unchanged(customer) => customer.id,
    };

    if let ProductChange::Create(product) = &product {
        insert_product(conn, product)?;
    }
    item.product_id = product.product().id.clone();

    let day_prefix = source.day_prefix(day);
    let sequence = next_sequence(conn, &order.organization_id, &day_prefix)?;
    order.order_number = source.order_number(day, sequence);

    insert_order(conn, &order)?;
    insert_item(conn, &item)?;
    insert_activity(conn, &activity)?;
    Ok(order)
}

/// Insert the customer unless another row won the race for the same phone;
/// returns the id of the stored customer either way.
fn insert_customer(conn: &Connection, c: &Customer) -> DomainResult<String> {
    conn.execute(
        &format!(
            "INSERT INTO customers ({CUSTOMER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (organization_id, phone) DO NOTHING"
        ),
        params![
            c.id,
            c.organization_id,
            c.name,
            c.phone,
            c.alt_phone,
            c.email,
            c.address,
            c.city,
            c.postal_code,
            to_millis(c.created_at),
            to_millis(c.updated_at),
        ],
    )
    .map_err(to_domain)?;
    conn.query_row(
        "SELECT id FROM customers WHERE organization_id = ?1 AND phone = ?2",
        params![c.organization_id, c.phone],
        |row| row.get(0),
    )
    .map_err(to_domain)
}

fn update_customer(conn: &Connection, c: &Customer) -> DomainResult<()> {
    conn.execute(
        "UPDATE customers SET name = ?2, alt_phone = ?3, email = ?4, address = ?5, city = ?6,
            postal_code = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            c.id,
            c.name,
            c.alt_phone,
            c.email,
            c.address,
            c.city,
            c.postal_code,
            to_millis(c.updated_at),
        ],
    )
    .map_err(to_domain)?;
    Ok(())
}

fn insert_product(conn: &Connection, p: &Product) -> DomainResult<()> {
    conn.execute(
        &format!("INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![p.id, p.organization_id, p.name, p.sku, p.price, p.stock, to_millis(p.created_at)],
    )
    .map_err(to_domain)?;
    Ok(())
}

/// Next sequence for `(organization, day prefix)`. The counter row is seeded
/// from the orders already numbered for that day.
fn next_sequence(conn: &Connection, organization_id: &str, day_prefix: &str) -> DomainResult<u32> {
    conn.execute(
        "INSERT INTO order_sequences (organization_id, day_prefix, last_value)
         VALUES (?1, ?2, (
             SELECT COUNT(*) FROM orders
             WHERE organization_id = ?1 AND order_number LIKE ?3 ESCAPE '\\'
         ))
         ON CONFLICT (organization_id, day_prefix) DO NOTHING",
        params![organization_id, day_prefix, format!("{}%", like_escape(day_prefix))],
    )
    .map_err(to_domain)?;
    let value: i64 = conn
        .query_row(
            "UPDATE order_sequences SET last_value = last_value + 1
             WHERE organization_id = ?1 AND day_prefix = ?2
             RETURNING last_value",
            params![organization_id, day_prefix],
            |row| row.get(0),
        )
        .map_err(to_domain)?;
    u32::try_from(value).map_err(|_| {
        OrderLinkError::InvalidState(format!("order sequence overflow for {day_prefix}"))
    })
}

fn insert_order(conn: &Connection, o: &Order) -> DomainResult<()> {
    conn.execute(
        "INSERT INTO orders (
            id, organization_id, order_number, customer_id, source, status, order_date,
            total_amount, notes, flagged, flag_note, sync_operation_id, spreadsheet_id,
            sheet_row, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            o.id,
            o.organization_id,
            o.order_number,
            o.customer_id,
            o.source.as_str(),
            o.status.as_str(),
            day_text(o.order_date),
            o.total_amount,
            o.notes,
            o.flagged,
            o.flag_note,
            o.sync_operation_id,
            o.spreadsheet_id,
            o.sheet_row,
            to_millis(o.created_at),
        ],
    )
    .map_err(to_domain)?;
    Ok(())
}

fn insert_item(conn: &Connection, i: &OrderItem) -> DomainResult<()> {
    conn.execute(
        "INSERT INTO order_items (id, order_id, product_id, product_name, sku, variant, quantity, unit_price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![i.id, i.order_id, i.product_id, i.product_name, i.sku, i.variant, i.quantity, i.unit_price],
    )
    .map_err(to_domain)?;
    Ok(())
}

fn insert_activity(conn: &Connection, a: &OrderActivity) -> DomainResult<()> {
    conn.execute(
        "INSERT INTO order_activities (id, order_id, kind, message, sync_operation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![a.id, a.order_id, a.kind, a.message, a.sync_operation_id, to_millis(a.created_at)],
    )
    .map_err(to_domain)?;
    Ok(())
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn map_existing_order_row(row: &Row<'_>) -> rusqlite::Result<ExistingOrder> {
    let order_date: String = row.get(2)?;
    Ok(ExistingOrder {
        order_id: row.get(0)?,
        order_number: row.get(1)?,
        order_date: parse_day(2, &order_date)?,
        customer_name: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        city: row.get(6)?,
        product_name: row.get(7)?,
        product_sku: row.get(8)?,
        total_amount: row.get(9)?,
        created_at: from_millis(10, row.get(10)?)?,
    })
}

fn map_customer_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        alt_phone: row.get(4)?,
        email: row.get(5)?,
        address: row.get(6)?,
        city: row.get(7)?,
        postal_code: row.get(8)?,
        created_at: from_millis(9, row.get(9)?)?,
        updated_at: from_millis(10, row.get(10)?)?,
    })
}

fn map_product_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        sku: row.get(3)?,
        price: row.get(4)?,
        stock: row.get(5)?,
        created_at: from_millis(6, row.get(6)?)?,
    })
}

fn map_order_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let source: String = row.get(4)?;
    let status: String = row.get(5)?;
    let order_date: String = row.get(6)?;
    Ok(Order {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        order_number: row.get(2)?,
        customer_id: row.get(3)?,
        source: parse_text(4, &source)?,
        status: parse_text(5, &status)?,
        order_date: parse_day(6, &order_date)?,
        total_amount: row.get(7)?,
        notes: row.get(8)?,
        flagged: row.get(9)?,
        flag_note: row.get(10)?,
        sync_operation_id: row.get(11)?,
        spreadsheet_id: row.get(12)?,
        sheet_row: row.get(13)?,
        created_at: from_millis(14, row.get(14)?)?,
    })
}
