//! Port interface for querying existing orders

use async_trait::async_trait;
use chrono::NaiveDate;
use orderlink_domain::{ExistingOrder, Result};

/// Read-only view of stored orders used by duplicate detection.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// Orders of the organization for `phone` dated within `[from, to]`,
    /// most recent first.
    async fn find_by_phone_between(
        &self,
        organization_id: &str,
        phone: &str,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ExistingOrder>>;

    /// Orders dated `date` whose customer name contains `first_name` or
    /// whose address starts with `address_prefix` (both case-insensitive).
    async fn find_same_day_candidates(
        &self,
        organization_id: &str,
        date: NaiveDate,
        first_name: Option<&str>,
        address_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExistingOrder>>;
}
