use canteen_common::Money;

use crate::db_types::{LedgerEntry, Order, OrderStatus, PaymentRequest, PaymentSubmission, ShopId, StudentId};

/// The result of a committed status transition: the updated order, where it came from, and the
/// ledger entry the transition posted, if any (completion debit or cancellation refund).
#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub order: Order,
    pub previous_status: OrderStatus,
    pub ledger_entry: Option<LedgerEntry>,
}

/// The result of settling one payment-request obligation.
#[derive(Debug, Clone)]
pub struct SettledSubmission {
    pub request: PaymentRequest,
    pub submission: PaymentSubmission,
    pub ledger_entry: LedgerEntry,
}

/// The outcome of replaying a student's ledger against their cached balance.
#[derive(Debug, Clone)]
pub struct BalanceReconciliation {
    pub student_id: StudentId,
    /// The cached balance on the student record.
    pub cached: Money,
    /// Credits + refunds − debits, replayed across every partition.
    pub replayed: Money,
    /// Number of ledger entries replayed.
    pub entries: i64,
}

impl BalanceReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.replayed
    }
}

/// Completed-order rollup for one shop over a date range.
#[derive(Debug, Clone)]
pub struct SalesSummary {
    pub shop_id: ShopId,
    pub orders_completed: i64,
    pub gross_revenue: Money,
    pub distinct_students: i64,
}

/// One day's slice of a shop's completed orders.
#[derive(Debug, Clone)]
pub struct DailySales {
    /// Calendar day, `YYYY-MM-DD`.
    pub day: String,
    pub orders_completed: i64,
    pub gross_revenue: Money,
}
