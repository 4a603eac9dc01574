use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{LedgerEntryType, OrderNo};

pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Filter and pagination for a student's wallet history.
///
/// When both ends of the date range are set, only the monthly partitions overlapping the range
/// are queried; otherwise every existing partition is consulted. Pagination is applied to the
/// merged, globally re-sorted result — offsets address the combined history, not any single
/// partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerQueryFilter {
    pub entry_type: Option<LedgerEntryType>,
    pub order_no: Option<OrderNo>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for LedgerQueryFilter {
    fn default() -> Self {
        Self { entry_type: None, order_no: None, since: None, until: None, offset: 0, limit: DEFAULT_PAGE_SIZE }
    }
}

impl LedgerQueryFilter {
    pub fn with_entry_type(mut self, entry_type: LedgerEntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn with_order_no(mut self, order_no: OrderNo) -> Self {
        self.order_no = Some(order_no);
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn paged(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset.max(0);
        self.limit = limit.max(0);
        self
    }
}
