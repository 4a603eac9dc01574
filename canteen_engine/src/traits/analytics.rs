use chrono::{DateTime, Utc};

use crate::{
    db_types::ShopId,
    traits::{AccountApiError, DailySales, SalesSummary},
};

/// Read-only rollups over completed orders for one shop. Nothing here mutates state, and nothing
/// here is consulted by the order or wallet flows.
#[allow(async_fn_in_trait)]
pub trait ShopAnalytics {
    /// Completed-order count, gross revenue and distinct-customer count over the range.
    async fn sales_summary(
        &self,
        shop_id: &ShopId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SalesSummary, AccountApiError>;

    /// Per-day completed-order rollups over the range, oldest day first.
    async fn daily_sales(
        &self,
        shop_id: &ShopId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DailySales>, AccountApiError>;
}
