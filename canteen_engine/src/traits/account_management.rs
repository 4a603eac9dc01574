use thiserror::Error;

use crate::{
    api::{ledger_objects::LedgerQueryFilter, order_objects::OrderQueryFilter},
    db_types::{
        LedgerEntry,
        Order,
        OrderNo,
        OrderStatusChange,
        PaymentRequest,
        PaymentSubmission,
        Shop,
        ShopId,
        Student,
        StudentId,
    },
};

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        AccountApiError::DatabaseError(e.to_string())
    }
}

/// The read-only query surface over students, shops, orders and the wallet ledger.
///
/// The mutation machinery lives in [`CanteenDatabase`](crate::traits::CanteenDatabase);
/// `AccountManagement` only ever observes committed state.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches a student by id, regardless of their active/approved flags. `None` if absent.
    async fn fetch_student(&self, student_id: &StudentId) -> Result<Option<Student>, AccountApiError>;

    async fn fetch_shop(&self, shop_id: &ShopId) -> Result<Option<Shop>, AccountApiError>;

    /// Fetches an order, including its item snapshots, by its public order number.
    async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<Order>, AccountApiError>;

    /// Fetches orders matching the given filter, ordered by creation time ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, AccountApiError>;

    /// The realized status history of an order, oldest first. The first row is the creation row.
    async fn order_history(&self, order_no: &OrderNo) -> Result<Vec<OrderStatusChange>, AccountApiError>;

    /// Queries the student's wallet ledger across every monthly partition the filter's date range
    /// touches. Results from all partitions are merged, globally re-sorted newest-first, and then
    /// paginated — no single partition holds a global ordering across the range.
    async fn ledger_history(
        &self,
        student_id: &StudentId,
        filter: LedgerQueryFilter,
    ) -> Result<Vec<LedgerEntry>, AccountApiError>;

    async fn fetch_payment_request(&self, request_id: i64) -> Result<Option<PaymentRequest>, AccountApiError>;

    /// The submission for one (request, student) pair, if that student was targeted.
    async fn fetch_submission(
        &self,
        request_id: i64,
        student_id: &StudentId,
    ) -> Result<Option<PaymentSubmission>, AccountApiError>;

    async fn submissions_for_request(&self, request_id: i64) -> Result<Vec<PaymentSubmission>, AccountApiError>;
}
