//! In-memory order store and sync operation repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use orderlink_core::duplicates::ports::OrderLookup;
use orderlink_core::orders::ports::{CustomerChange, MaterializationPlan, OrderStore, ProductChange};
use orderlink_core::sync::ports::SyncOperationRepository;
use orderlink_domain::{
    Customer, ExistingOrder, Order, OrderItem, OrderLinkError, Product, Result as DomainResult,
    SyncOperation,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Tables {
    customers: HashMap<String, Customer>,
    products: HashMap<String, Product>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    sequences: HashMap<(String, String), u32>,
    activities: usize,
}

/// `OrderStore` + `OrderLookup` over plain collections.
#[derive(Default, Clone)]
pub struct InMemoryOrders {
    tables: Arc<Mutex<Tables>>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryOrders {
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn orders(&self) -> Vec<Order> {
        self.tables.lock().orders.clone()
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.tables.lock().customers.values().cloned().collect()
    }

    pub fn products(&self) -> Vec<Product> {
        self.tables.lock().products.values().cloned().collect()
    }

    pub fn activity_count(&self) -> usize {
        self.tables.lock().activities
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.tables.lock().customers.insert(customer.id.clone(), customer);
    }

    fn existing(tables: &Tables, order: &Order) -> ExistingOrder {
        let customer = tables.customers.get(&order.customer_id);
        let item = tables.items.iter().find(|item| item.order_id == order.id);
        ExistingOrder {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            order_date: order.order_date,
            customer_name: customer.map(|c| c.name.clone()).unwrap_or_default(),
            phone: customer.map(|c| c.phone.clone()).unwrap_or_default(),
            address: customer.and_then(|c| c.address.clone()),
            city: customer.and_then(|c| c.city.clone()),
            product_name: item.map(|i| i.product_name.clone()),
            product_sku: item.and_then(|i| i.sku.clone()),
            total_amount: order.total_amount,
            created_at: order.created_at,
        }
    }
}

#[async_trait]
impl OrderLookup for InMemoryOrders {
    async fn find_by_phone_between(
        &self,
        organization_id: &str,
        phone: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> DomainResult<Vec<ExistingOrder>> {
        let tables = self.tables.lock();
        let mut found: Vec<ExistingOrder> = tables
            .orders
            .iter()
            .filter(|o| o.organization_id == organization_id && o.order_date >= from && o.order_date <= to)
            .map(|o| Self::existing(&tables, o))
            .filter(|e| e.phone == phone)
            .collect();
        found.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.created_at.cmp(&a.created_at)));
        found.truncate(limit);
        Ok(found)
    }

    async fn find_same_day_candidates(
        &self,
        organization_id: &str,
        date: NaiveDate,
        first_name: Option<&str>,
        address_prefix: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<ExistingOrder>> {
        let tables = self.tables.lock();
        let first_name = first_name.map(str::to_lowercase);
        let prefix = address_prefix.map(str::to_lowercase);
        Ok(tables
            .orders
            .iter()
            .filter(|o| o.organization_id == organization_id && o.order_date == date)
            .map(|o| Self::existing(&tables, o))
            .filter(|e| {
                let by_name = first_name.as_ref().is_some_and(|n| e.customer_name.to_lowercase().contains(n));
                let by_address = prefix.as_ref().is_some_and(|p| {
                    e.address.as_deref().is_some_and(|a| a.to_lowercase().starts_with(p))
                });
                by_name || by_address
            })
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrders {
    async fn find_customer_by_phone(&self, organization_id: &str, phone: &str) -> DomainResult<Option<Customer>> {
        Ok(self
            .tables
            .lock()
            .customers
            .values()
            .find(|c| c.organization_id == organization_id && c.phone == phone)
            .cloned())
    }

    async fn find_product(&self, organization_id: &str, sku: Option<&str>, name: &str) -> DomainResult<Option<Product>> {
        let tables = self.tables.lock();
        let in_org = || tables.products.values().filter(|p| p.organization_id == organization_id);
        if let Some(sku) = sku {
            if let Some(product) = in_org().find(|p| p.sku.as_deref() == Some(sku)) {
                return Ok(Some(product.clone()));
            }
        }
        Ok(in_org().find(|p| p.name.eq_ignore_ascii_case(name)).cloned())
    }

    async fn commit(&self, plan: MaterializationPlan) -> DomainResult<Order> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(OrderLinkError::Database("database is locked".into()));
        }
        let mut tables = self.tables.lock();
        let (source, day) = plan.numbering();
        let key = (plan.order.organization_id.clone(), source.day_prefix(day));
        let sequence = {
            let seq = tables.sequences.entry(key).or_insert(0);
            *seq += 1;
            *seq
        };

        match plan.customer {
            CustomerChange::Create(c) | CustomerChange::Backfill(c) => {
                tables.customers.insert(c.id.clone(), c);
            }
            CustomerChange::Unchanged(_) => {}
        }
        if let ProductChange::Create(p) = plan.product {
            tables.products.insert(p.id.clone(), p);
        }

        let mut order = plan.order;
        order.order_number = source.order_number(day, sequence);
        tables.orders.push(order.clone());
        tables.items.push(plan.item);
        tables.activities += 1;
        Ok(order)
    }
}

/// `SyncOperationRepository` that enforces the terminal-row rule.
#[derive(Default, Clone)]
pub struct InMemorySyncOperations {
    rows: Arc<Mutex<HashMap<String, SyncOperation>>>,
    saves: Arc<Mutex<Vec<SyncOperation>>>,
}

impl InMemorySyncOperations {
    pub fn get(&self, id: &str) -> SyncOperation {
        self.rows.lock().get(id).cloned().expect("operation exists")
    }

    /// Every saved snapshot, in order.
    pub fn saves(&self) -> Vec<SyncOperation> {
        self.saves.lock().clone()
    }
}

#[async_trait]
impl SyncOperationRepository for InMemorySyncOperations {
    async fn create(&self, operation: &SyncOperation) -> DomainResult<()> {
        self.rows.lock().insert(operation.id.clone(), operation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<SyncOperation>> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn save(&self, operation: &SyncOperation) -> DomainResult<()> {
        let mut rows = self.rows.lock();
        match rows.get(&operation.id) {
            Some(stored) if stored.status.is_terminal() => {
                Err(OrderLinkError::InvalidState(format!("sync operation {} is final", operation.id)))
            }
            Some(_) => {
                rows.insert(operation.id.clone(), operation.clone());
                self.saves.lock().push(operation.clone());
                Ok(())
            }
            None => Err(OrderLinkError::NotFound(operation.id.clone())),
        }
    }

    async fn list_by_connection(&self, connection_id: &str, limit: usize) -> DomainResult<Vec<SyncOperation>> {
        let mut found: Vec<SyncOperation> =
            self.rows.lock().values().filter(|op| op.connection_id == connection_id).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }
}
