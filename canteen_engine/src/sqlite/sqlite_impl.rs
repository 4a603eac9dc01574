//! `SqliteDatabase` is the concrete SQLite backend of the canteen engine.
//!
//! Every mutating trait method opens one transaction, composes the low-level functions from
//! [`db`](super::db), and commits — the order or submission write, the student's balance and the
//! ledger entry always land together or not at all.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;

use super::db::{self, billing, catalog, ledger, orders, partitions::PartitionRegistry, schema, students};
use crate::{
    api::{ledger_objects::LedgerQueryFilter, order_objects::OrderQueryFilter},
    db_types::{
        Actor,
        LedgerEntry,
        LedgerEntryType,
        MenuItemId,
        Money,
        NewLedgerEntry,
        NewOrder,
        NewPaymentRequest,
        Order,
        OrderItem,
        OrderNo,
        OrderStatus,
        OrderStatusChange,
        PaymentRequest,
        PaymentRequestStatus,
        PaymentStatus,
        PaymentSubmission,
        Shop,
        ShopId,
        Student,
        StudentId,
    },
    helpers,
    traits::{
        AccountApiError,
        AccountManagement,
        BalanceReconciliation,
        CanteenDatabase,
        CanteenDbError,
        DailySales,
        OrderTransition,
        SalesSummary,
        SettledSubmission,
        ShopAnalytics,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    partitions: PartitionRegistry,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects using the URL from `CANTEEN_DATABASE_URL` (or the built-in default).
    pub async fn new(max_connections: u32) -> Result<Self, CanteenDbError> {
        let url = db::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, CanteenDbError> {
        let pool = db::new_pool(url, max_connections).await?;
        let mut conn = pool.acquire().await?;
        schema::create_schema(&mut conn).await?;
        drop(conn);
        Ok(Self { url: url.to_string(), pool, partitions: PartitionRegistry::default() })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Makes sure the monthly partition for `at` exists, on an autocommit connection. Run before
    /// opening a posting transaction: the DDL commits on its own, so a later rollback of the
    /// posting can never take the table (or the registry's cached view of it) with it.
    async fn ensure_partition_for(&self, at: chrono::DateTime<Utc>) -> Result<(), CanteenDbError> {
        let partition = super::db::partitions::partition_for(at);
        let mut conn = self.pool.acquire().await?;
        self.partitions.ensure(&partition, &mut conn).await?;
        Ok(())
    }

    /// Posts a ledger entry with an explicit creation instant, landing it in that instant's
    /// partition. Exists for backdated corrective entries; day-to-day postings go through
    /// [`CanteenDatabase::post_ledger_entry`], which stamps the current time.
    pub async fn post_entry_at(
        &self,
        entry: NewLedgerEntry,
        at: chrono::DateTime<Utc>,
    ) -> Result<LedgerEntry, CanteenDbError> {
        self.ensure_partition_for(at).await?;
        let mut tx = self.pool.begin().await?;
        let posted = ledger::post_with_balance(entry, at, &mut tx).await?;
        tx.commit().await?;
        Ok(posted)
    }
}

impl CanteenDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, CanteenDbError> {
        if order.lines.is_empty() {
            return Err(CanteenDbError::Validation("an order needs at least one item".to_string()));
        }
        if order.lines.iter().any(|line| line.quantity <= 0) {
            return Err(CanteenDbError::Validation("item quantities must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let student = students::fetch_student(&order.student_id, &mut tx)
            .await?
            .filter(Student::is_eligible)
            .ok_or_else(|| CanteenDbError::StudentNotFound(order.student_id.clone()))?;
        let shop = catalog::fetch_shop(&order.shop_id, &mut tx)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| CanteenDbError::ShopNotFound(order.shop_id.clone()))?;
        if shop.service != order.service {
            return Err(CanteenDbError::Validation(format!(
                "shop {} does not offer {} orders",
                shop.id, order.service
            )));
        }

        let requested: Vec<MenuItemId> = order.lines.iter().map(|l| l.item_id.clone()).collect();
        let menu = catalog::fetch_menu_items(&order.shop_id, &requested, &mut tx).await?;
        let mut unavailable = Vec::new();
        let mut items = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            match menu.iter().find(|m| m.id == line.item_id) {
                Some(item) if item.available => items.push(OrderItem {
                    item_id: item.id.clone(),
                    name: item.name.clone(),
                    unit_price: item.price,
                    offer_price: item.offer_price,
                    quantity: line.quantity,
                    subtotal: item.effective_price() * line.quantity,
                    image: item.image.clone(),
                    delivered: false,
                }),
                Some(item) => unavailable.push(item.name.clone()),
                None => unavailable.push(line.item_id.to_string()),
            }
        }
        if !unavailable.is_empty() {
            return Err(CanteenDbError::ItemsUnavailable(unavailable));
        }

        let total: Money = items.iter().map(|i| i.subtotal).sum();
        // The wallet is only debited at completion, but a student should not be able to queue
        // orders their balance visibly cannot cover.
        if student.balance < total {
            return Err(CanteenDbError::InsufficientBalance { required: total, available: student.balance });
        }

        let now = Utc::now();
        let day = now.format("%Y%m%d").to_string();
        let seq = orders::next_daily_sequence(&day, &mut tx).await?;
        let order_no = OrderNo::from(format!("{day}-{seq:04}"));
        let items_json = serde_json::to_string(&items)
            .map_err(|e| CanteenDbError::DatabaseError(format!("item snapshot could not be encoded: {e}")))?;
        let details_json = order
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CanteenDbError::Validation(format!("service details could not be encoded: {e}")))?;
        let record = orders::OrderInsert {
            order_no: order_no.clone(),
            student_id: order.student_id,
            shop_id: order.shop_id,
            service: order.service,
            details: details_json,
            items: items_json,
            total,
            pickup_code: helpers::new_pickup_code(),
            notes: order.notes,
            created_at: now,
        };
        let saved = orders::insert_order(record, &mut tx).await?;
        orders::record_history(&order_no, None, OrderStatus::Pending, None, None, now, &mut tx).await?;
        tx.commit().await?;
        info!("🍽️ Order [{}] created for {}: {} ({} lines)", saved.order_no, saved.student_id, saved.total, saved.items.len());
        Ok(saved)
    }

    async fn transition_order(
        &self,
        order_no: &OrderNo,
        new_status: OrderStatus,
        require_from: Option<OrderStatus>,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<OrderTransition, CanteenDbError> {
        // a completion debit or cancellation refund may land in the current month's partition
        let now = Utc::now();
        self.ensure_partition_for(now).await?;
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_no(order_no, &mut tx)
            .await?
            .ok_or_else(|| CanteenDbError::OrderNotFound(order_no.clone()))?;
        let from = order.status;
        if let Some(required) = require_from {
            if from != required {
                return Err(CanteenDbError::PreconditionFailed(format!(
                    "order {order_no} is {from}, expected {required}"
                )));
            }
        }
        if !from.can_transition_to(new_status) {
            return Err(CanteenDbError::InvalidTransition { from, to: new_status });
        }

        let mut ledger_entry = None;
        let mut payment_status = None;
        if new_status == OrderStatus::Completed && order.payment_status != PaymentStatus::Paid {
            let entry = NewLedgerEntry::new(
                order.student_id.clone(),
                LedgerEntryType::Debit,
                order.total,
                format!("Payment for order {}", order.order_no),
            )
            .for_order(order.order_no.clone())
            .by_actor(actor.id.clone());
            // The balance is re-read inside this transaction; it may have drifted below the
            // total since the order was placed.
            let posted = ledger::post_with_balance(entry, now, &mut tx).await.map_err(|e| match e {
                CanteenDbError::InsufficientBalance { required, available } => {
                    CanteenDbError::InsufficientBalanceOnCompletion { required, available }
                },
                other => other,
            })?;
            ledger_entry = Some(posted);
            payment_status = Some(PaymentStatus::Paid);
        }
        if new_status == OrderStatus::Cancelled && order.payment_status == PaymentStatus::Paid {
            let entry = NewLedgerEntry::new(
                order.student_id.clone(),
                LedgerEntryType::Refund,
                order.total,
                format!("Refund for cancelled order {}", order.order_no),
            )
            .for_order(order.order_no.clone())
            .by_actor(actor.id.clone());
            ledger_entry = Some(ledger::post_with_balance(entry, now, &mut tx).await?);
            payment_status = Some(PaymentStatus::Refunded);
        }

        let mut updated = orders::update_status_checked(order.id, from, new_status, &actor.id, reason.as_deref(), &mut tx)
            .await?
            // the order moved underneath us since the read above; abort and let the caller retry
            .ok_or(CanteenDbError::TransactionConflict)?;
        if let Some(payment_status) = payment_status {
            updated = orders::set_payment_status(order.id, payment_status, &mut tx).await?;
        }
        orders::record_history(order_no, Some(from), new_status, Some(&actor.id), reason.as_deref(), now, &mut tx)
            .await?;
        tx.commit().await?;
        info!("🍽️ Order [{}] moved {from} -> {new_status} by {}", updated.order_no, actor.id);
        Ok(OrderTransition { order: updated, previous_status: from, ledger_entry })
    }

    async fn record_item_delivery(
        &self,
        order_no: &OrderNo,
        item_ids: &[MenuItemId],
        actor: &Actor,
    ) -> Result<Order, CanteenDbError> {
        if item_ids.is_empty() {
            return Err(CanteenDbError::Validation("no item lines named for delivery".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_no(order_no, &mut tx)
            .await?
            .ok_or_else(|| CanteenDbError::OrderNotFound(order_no.clone()))?;
        if !matches!(order.status, OrderStatus::Ready | OrderStatus::PartiallyDelivered) {
            return Err(CanteenDbError::PreconditionFailed(format!(
                "items can only be handed over once the order is ready (order {order_no} is {})",
                order.status
            )));
        }
        let mut items = order.items.clone();
        let mut unknown = Vec::new();
        for item_id in item_ids {
            match items.iter_mut().find(|i| &i.item_id == item_id) {
                Some(item) => item.delivered = true,
                None => unknown.push(item_id.to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(CanteenDbError::Validation(format!(
                "order {order_no} has no lines for: {}",
                unknown.join(", ")
            )));
        }
        let items_json = serde_json::to_string(&items)
            .map_err(|e| CanteenDbError::DatabaseError(format!("item snapshot could not be encoded: {e}")))?;
        let mut updated = orders::update_items(order.id, &items_json, &mut tx).await?;
        if order.status == OrderStatus::Ready {
            let now = Utc::now();
            updated = orders::update_status_checked(
                order.id,
                OrderStatus::Ready,
                OrderStatus::PartiallyDelivered,
                &actor.id,
                None,
                &mut tx,
            )
            .await?
            .ok_or(CanteenDbError::TransactionConflict)?;
            orders::record_history(
                order_no,
                Some(OrderStatus::Ready),
                OrderStatus::PartiallyDelivered,
                Some(&actor.id),
                None,
                now,
                &mut tx,
            )
            .await?;
        }
        tx.commit().await?;
        debug!("🍽️ Order [{}]: {} line(s) handed over by {}", updated.order_no, item_ids.len(), actor.id);
        Ok(updated)
    }

    async fn post_ledger_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, CanteenDbError> {
        self.post_entry_at(entry, Utc::now()).await
    }

    async fn reconcile_balance(&self, student_id: &StudentId) -> Result<BalanceReconciliation, CanteenDbError> {
        let mut tx = self.pool.begin().await?;
        let student = students::fetch_student(student_id, &mut tx)
            .await?
            .ok_or_else(|| CanteenDbError::StudentNotFound(student_id.clone()))?;
        let partitions = self.partitions.existing(&mut tx).await?;
        let mut replayed = Money::default();
        let mut entries = 0i64;
        for partition in &partitions {
            let (sum, count) = ledger::replay_in_partition(partition, student_id, &mut tx).await?;
            replayed = replayed + sum;
            entries += count;
        }
        tx.commit().await?;
        if replayed != student.balance {
            warn!(
                "🧾 Balance drift for {student_id}: cached {} but the ledger replays to {replayed} over {entries} entries",
                student.balance
            );
        }
        Ok(BalanceReconciliation { student_id: student_id.clone(), cached: student.balance, replayed, entries })
    }

    async fn create_payment_request(
        &self,
        request: NewPaymentRequest,
        created_by: &str,
    ) -> Result<PaymentRequest, CanteenDbError> {
        if request.title.trim().is_empty() {
            return Err(CanteenDbError::Validation("a payment request needs a title".to_string()));
        }
        if !request.amount.is_positive() {
            return Err(CanteenDbError::Validation(format!(
                "payment request amounts must be positive, got {}",
                request.amount
            )));
        }
        let mut tx = self.pool.begin().await?;
        let targets = students::eligible_ids(&request.selector, &mut tx).await?;
        if targets.is_empty() {
            return Err(CanteenDbError::NoEligibleTargets);
        }
        let now = Utc::now();
        let saved = billing::insert_request(&request, created_by, targets.len() as i64, now, &mut tx).await?;
        billing::insert_submissions(saved.id, saved.amount, &targets, now, &mut tx).await?;
        tx.commit().await?;
        info!(
            "💳 Payment request #{} ({}) created by {created_by}: {} from {} students",
            saved.id, saved.title, saved.amount, saved.total_target_count
        );
        Ok(saved)
    }

    async fn settle_submission(
        &self,
        student_id: &StudentId,
        request_id: i64,
    ) -> Result<SettledSubmission, CanteenDbError> {
        let now = Utc::now();
        self.ensure_partition_for(now).await?;
        let mut tx = self.pool.begin().await?;
        let request = billing::fetch_request(request_id, &mut tx)
            .await?
            .ok_or(CanteenDbError::RequestNotFound(request_id))?;
        if request.status != PaymentRequestStatus::Active {
            return Err(CanteenDbError::RequestInactive);
        }
        let submission = billing::fetch_submission(request_id, student_id, &mut tx)
            .await?
            .ok_or(CanteenDbError::NotEligible)?;
        if submission.status == PaymentStatus::Paid {
            return Err(CanteenDbError::AlreadyPaid);
        }

        let entry = NewLedgerEntry::new(
            student_id.clone(),
            LedgerEntryType::Debit,
            submission.amount,
            format!("Payment: {}", request.title),
        )
        .with_metadata(serde_json::json!({ "payment_request_id": request.id }));
        let posted = ledger::post_with_balance(entry, now, &mut tx).await?;
        let submission = billing::mark_submission_paid(submission.id, &posted.reference(), now, &mut tx)
            .await?
            // status flipped between our read and the guarded update
            .ok_or(CanteenDbError::AlreadyPaid)?;
        let request = billing::bump_request_counters(request_id, submission.amount, &mut tx).await?;
        tx.commit().await?;
        info!(
            "💳 {} settled request #{} for {} ({} of {} paid)",
            student_id, request.id, submission.amount, request.paid_count, request.total_target_count
        );
        Ok(SettledSubmission { request, submission, ledger_entry: posted })
    }

    async fn close_payment_request(
        &self,
        request_id: i64,
        status: PaymentRequestStatus,
    ) -> Result<PaymentRequest, CanteenDbError> {
        if status == PaymentRequestStatus::Active {
            return Err(CanteenDbError::Validation("a request can only be closed or cancelled".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let request = billing::close_request(request_id, status, &mut tx).await?;
        let request = match request {
            Some(request) => request,
            None => {
                // distinguish "no such request" from "not active any more"
                return match billing::fetch_request(request_id, &mut tx).await? {
                    Some(_) => Err(CanteenDbError::PreconditionFailed(
                        "only an active payment request can be closed".to_string(),
                    )),
                    None => Err(CanteenDbError::RequestNotFound(request_id)),
                };
            },
        };
        tx.commit().await?;
        info!("💳 Payment request #{} is now {status}", request.id);
        Ok(request)
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_student(&self, student_id: &StudentId) -> Result<Option<Student>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        students::fetch_student(student_id, &mut conn).await
    }

    async fn fetch_shop(&self, shop_id: &ShopId) -> Result<Option<Shop>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        catalog::fetch_shop(shop_id, &mut conn).await
    }

    async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_no(order_no, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(query, &mut conn).await
    }

    async fn order_history(&self, order_no: &OrderNo) -> Result<Vec<OrderStatusChange>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_history(order_no, &mut conn).await
    }

    async fn ledger_history(
        &self,
        student_id: &StudentId,
        filter: LedgerQueryFilter,
    ) -> Result<Vec<LedgerEntry>, AccountApiError> {
        use super::db::partitions::months_spanning;
        let mut conn = self.pool.acquire().await?;
        let existing = self.partitions.existing(&mut conn).await?;
        let candidates: Vec<String> = match (filter.since, filter.until) {
            (Some(since), Some(until)) => months_spanning(since, until)
                .into_iter()
                .filter(|p| existing.iter().any(|e| e == p))
                .collect(),
            _ => existing,
        };
        let mut merged = Vec::new();
        for partition in &candidates {
            let mut entries = ledger::entries_in_partition(partition, student_id, &filter, &mut conn).await?;
            merged.append(&mut entries);
        }
        // no single partition holds a global ordering across the range; sort the merged set
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.max(0) as usize;
        Ok(merged.into_iter().skip(offset).take(limit).collect())
    }

    async fn fetch_payment_request(&self, request_id: i64) -> Result<Option<PaymentRequest>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        billing::fetch_request(request_id, &mut conn).await
    }

    async fn fetch_submission(
        &self,
        request_id: i64,
        student_id: &StudentId,
    ) -> Result<Option<PaymentSubmission>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        billing::fetch_submission(request_id, student_id, &mut conn).await
    }

    async fn submissions_for_request(&self, request_id: i64) -> Result<Vec<PaymentSubmission>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        billing::submissions_for_request(request_id, &mut conn).await
    }
}

impl ShopAnalytics for SqliteDatabase {
    async fn sales_summary(
        &self,
        shop_id: &ShopId,
        since: chrono::DateTime<Utc>,
        until: chrono::DateTime<Utc>,
    ) -> Result<SalesSummary, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let (orders_completed, revenue, distinct_students): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(total), 0), COUNT(DISTINCT student_id)
            FROM orders
            WHERE shop_id = $1 AND status = 'completed' AND created_at >= $2 AND created_at <= $3
            "#,
        )
        .bind(shop_id)
        .bind(since)
        .bind(until)
        .fetch_one(&mut *conn)
        .await?;
        Ok(SalesSummary {
            shop_id: shop_id.clone(),
            orders_completed,
            gross_revenue: Money::from(revenue),
            distinct_students,
        })
    }

    async fn daily_sales(
        &self,
        shop_id: &ShopId,
        since: chrono::DateTime<Utc>,
        until: chrono::DateTime<Utc>,
    ) -> Result<Vec<DailySales>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT strftime('%Y-%m-%d', created_at) AS day, COUNT(*), COALESCE(SUM(total), 0)
            FROM orders
            WHERE shop_id = $1 AND status = 'completed' AND created_at >= $2 AND created_at <= $3
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(shop_id)
        .bind(since)
        .bind(until)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(day, orders_completed, revenue)| DailySales {
                day,
                orders_completed,
                gross_revenue: Money::from(revenue),
            })
            .collect())
    }
}
