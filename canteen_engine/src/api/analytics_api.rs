use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::{
    db_types::ShopId,
    traits::{AccountApiError, DailySales, SalesSummary, ShopAnalytics},
};

/// Read-only rollups over a shop's completed orders.
pub struct ShopAnalyticsApi<B> {
    db: B,
}

impl<B> Debug for ShopAnalyticsApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShopAnalyticsApi")
    }
}

impl<B> ShopAnalyticsApi<B>
where B: ShopAnalytics
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn sales_summary(
        &self,
        shop_id: &ShopId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SalesSummary, AccountApiError> {
        self.db.sales_summary(shop_id, since, until).await
    }

    pub async fn daily_sales(
        &self,
        shop_id: &ShopId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DailySales>, AccountApiError> {
        self.db.daily_sales(shop_id, since, until).await
    }
}
