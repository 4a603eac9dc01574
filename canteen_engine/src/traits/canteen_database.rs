use thiserror::Error;

use crate::{
    db_types::{
        Actor,
        LedgerEntry,
        MenuItemId,
        Money,
        NewLedgerEntry,
        NewOrder,
        NewPaymentRequest,
        Order,
        OrderNo,
        OrderStatus,
        PaymentRequest,
        PaymentRequestStatus,
        ShopId,
        StudentId,
    },
    traits::{AccountApiError, AccountManagement, BalanceReconciliation, OrderTransition, SettledSubmission},
};

/// The mutation surface of the canteen engine.
///
/// Every method runs as a single store-level transaction. Operations that touch a wallet couple
/// the balance write to the ledger entry that justifies it; there is deliberately no method that
/// writes a balance on its own.
#[allow(async_fn_in_trait)]
pub trait CanteenDatabase: Clone + AccountManagement {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Validates and stores a new order in one transaction.
    ///
    /// Validation covers the student (must exist, be active and approved), the shop (must exist
    /// and be active, and offer the requested service), and every requested line (the item must
    /// exist in that shop and be available). Prices are snapshotted into the order items using
    /// the active offer price where present; the total is the sum of line subtotals. The
    /// student's cached balance must cover the total, although no money moves yet — the wallet is
    /// charged at completion.
    ///
    /// Allocates the date-scoped daily-sequential order number and the pickup credential.
    async fn create_order(&self, order: NewOrder) -> Result<Order, CanteenDbError>;

    /// Moves an order along the status state machine, with all side effects in one transaction.
    ///
    /// * A transition not in the table ([`OrderStatus::can_transition_to`]) fails with
    ///   [`CanteenDbError::InvalidTransition`].
    /// * `require_from` pins the transition to an expected current status; if the order has moved
    ///   on, the call fails with [`CanteenDbError::PreconditionFailed`] without applying anything.
    /// * Completing an unpaid order re-reads the balance inside the transaction and posts a debit
    ///   of the order total; if funds have drifted below the total since creation, the whole
    ///   transition fails with [`CanteenDbError::InsufficientBalanceOnCompletion`] and the order
    ///   keeps its prior status.
    /// * Cancelling a paid order posts a refund of the order total.
    /// * Every transition appends a status-history row with the acting user and optional reason.
    ///
    /// Two concurrent attempts to advance the same order cannot both commit: the loser observes
    /// a store conflict or a failed status precondition and gets a retryable error.
    async fn transition_order(
        &self,
        order_no: &OrderNo,
        new_status: OrderStatus,
        require_from: Option<OrderStatus>,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<OrderTransition, CanteenDbError>;

    /// Marks the named item lines of an order as delivered, moving `ready` orders to
    /// `partially_delivered` through the normal transition machinery. Never completes the order —
    /// completion posts the debit and stays an explicit, separate call.
    async fn record_item_delivery(
        &self,
        order_no: &OrderNo,
        item_ids: &[MenuItemId],
        actor: &Actor,
    ) -> Result<Order, CanteenDbError>;

    /// Appends one ledger entry to the partition for the current month and updates the student's
    /// cached balance, both inside the same transaction. The `balance_before` snapshot is read
    /// inside that transaction, so two concurrent postings for one student can never both observe
    /// the same stale balance. A debit that would take the balance below zero fails with
    /// [`CanteenDbError::InsufficientBalance`].
    async fn post_ledger_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, CanteenDbError>;

    /// Replays the student's entire ledger (credits + refunds − debits across all partitions) and
    /// reports it against the cached balance. A corrective/audit operation; nothing invokes it
    /// automatically.
    async fn reconcile_balance(&self, student_id: &StudentId) -> Result<BalanceReconciliation, CanteenDbError>;

    /// Resolves the request's target selector into the concrete set of currently eligible
    /// (active + approved) students, then persists the request and one `pending` submission per
    /// target in a single transaction — a reader never sees a partial fan-out. Fails with
    /// [`CanteenDbError::NoEligibleTargets`] when the selector matches nobody, and with
    /// [`CanteenDbError::Validation`] when an explicit student list names unknown or ineligible
    /// students.
    async fn create_payment_request(
        &self,
        request: NewPaymentRequest,
        created_by: &str,
    ) -> Result<PaymentRequest, CanteenDbError>;

    /// Settles one student's obligation under a payment request: posts the debit, flips the
    /// submission to `paid` with the settling entry reference, and bumps the request's cached
    /// counters — atomically. A second call for the same (request, student) fails with
    /// [`CanteenDbError::AlreadyPaid`] instead of double-charging.
    async fn settle_submission(
        &self,
        student_id: &StudentId,
        request_id: i64,
    ) -> Result<SettledSubmission, CanteenDbError>;

    /// Closes or cancels an `active` payment request. No payments are accepted afterwards.
    async fn close_payment_request(
        &self,
        request_id: i64,
        status: PaymentRequestStatus,
    ) -> Result<PaymentRequest, CanteenDbError>;

    /// Closes the store connection.
    async fn close(&mut self) -> Result<(), CanteenDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CanteenDbError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The store reported a transient conflict; the operation may be retried")]
    TransactionConflict,
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Student {0} does not exist or may not transact")]
    StudentNotFound(StudentId),
    #[error("Shop {0} does not exist or is not active")]
    ShopNotFound(ShopId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderNo),
    #[error("Payment request #{0} does not exist")]
    RequestNotFound(i64),
    #[error("Some items are missing or unavailable: {}", .0.join(", "))]
    ItemsUnavailable(Vec<String>),
    #[error("Insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: Money, available: Money },
    #[error("Balance no longer covers the order total: {required} required, {available} available")]
    InsufficientBalanceOnCompletion { required: Money, available: Money },
    #[error("An order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("The record is not in a state that permits this action: {0}")]
    PreconditionFailed(String),
    #[error("This obligation has already been paid")]
    AlreadyPaid,
    #[error("The payment request is no longer accepting payments")]
    RequestInactive,
    #[error("The student has no obligation under this payment request")]
    NotEligible,
    #[error("The target selector matched no eligible students")]
    NoEligibleTargets,
    #[error("The pickup token was issued for a different shop")]
    ShopMismatch,
    #[error("The pickup credential does not match the order")]
    TokenMismatch,
    #[error("The order is not ready for pickup (status: {0})")]
    NotReady(OrderStatus),
    #[error("Not allowed: {0}")]
    Forbidden(String),
}

impl CanteenDbError {
    /// A stable machine-readable code, safe to surface to callers.
    pub fn code(&self) -> &'static str {
        use CanteenDbError::*;
        match self {
            DatabaseError(_) => "internal",
            TransactionConflict => "conflict",
            Validation(_) => "validation",
            StudentNotFound(_) | ShopNotFound(_) | OrderNotFound(_) | RequestNotFound(_) => "not_found",
            ItemsUnavailable(_) => "items_unavailable",
            InsufficientBalance { .. } => "insufficient_balance",
            InsufficientBalanceOnCompletion { .. } => "insufficient_balance_on_completion",
            InvalidTransition { .. } => "invalid_transition",
            PreconditionFailed(_) => "precondition_failed",
            AlreadyPaid => "already_paid",
            RequestInactive => "request_inactive",
            NotEligible => "not_eligible",
            NoEligibleTargets => "no_eligible_targets",
            ShopMismatch => "shop_mismatch",
            TokenMismatch => "token_mismatch",
            NotReady(_) => "not_ready",
            Forbidden(_) => "forbidden",
        }
    }

    /// Only store-level conflicts are safe to retry automatically. Balance and precondition
    /// failures reflect real state and must reach the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CanteenDbError::TransactionConflict)
    }
}

impl From<sqlx::Error> for CanteenDbError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            // SQLITE_BUSY / SQLITE_LOCKED: another writer held the store; the unit aborted cleanly
            if matches!(db.code().as_deref(), Some("5") | Some("6")) {
                return CanteenDbError::TransactionConflict;
            }
        }
        CanteenDbError::DatabaseError(e.to_string())
    }
}

impl From<AccountApiError> for CanteenDbError {
    fn from(e: AccountApiError) -> Self {
        match e {
            AccountApiError::DatabaseError(s) => CanteenDbError::DatabaseError(s),
            AccountApiError::QueryError(s) => CanteenDbError::Validation(s),
        }
    }
}
