use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{Money, Order, OrderNo, OrderStatus, OrderStatusChange, PaymentStatus, ServiceType, ShopId, StudentId},
    traits::{AccountApiError, CanteenDbError},
};

/// Everything needed to persist a validated, price-snapshotted order.
#[derive(Debug, Clone)]
pub struct OrderInsert {
    pub order_no: OrderNo,
    pub student_id: StudentId,
    pub shop_id: ShopId,
    pub service: ServiceType,
    pub details: Option<String>,
    pub items: String,
    pub total: Money,
    pub pickup_code: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Bumps and returns the daily order sequence for the given day key (`YYYYMMDD`).
pub(crate) async fn next_daily_sequence(day: &str, conn: &mut SqliteConnection) -> Result<i64, CanteenDbError> {
    let (seq,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO order_sequences (day, last_seq) VALUES ($1, 1)
        ON CONFLICT (day) DO UPDATE SET last_seq = last_seq + 1
        RETURNING last_seq
        "#,
    )
    .bind(day)
    .fetch_one(conn)
    .await?;
    Ok(seq)
}

/// Inserts a new order row. This is not atomic on its own; callers embed it in the creation
/// transaction and pass `&mut *tx` as the connection argument.
pub(crate) async fn insert_order(order: OrderInsert, conn: &mut SqliteConnection) -> Result<Order, CanteenDbError> {
    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders (
            order_no,
            student_id,
            shop_id,
            service,
            details,
            items,
            total,
            pickup_code,
            notes,
            created_at,
            updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        RETURNING *
        "#,
    )
    .bind(order.order_no)
    .bind(order.student_id)
    .bind(order.shop_id)
    .bind(order.service)
    .bind(order.details)
    .bind(order.items)
    .bind(order.total)
    .bind(order.pickup_code)
    .bind(order.notes)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] inserted with id {}", order.order_no, order.id);
    Ok(order)
}

pub async fn fetch_order_by_no(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, AccountApiError> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_no = $1").bind(order_no).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, AccountApiError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_no) = query.order_no {
        where_clause.push("order_no = ");
        where_clause.push_bind_unseparated(order_no.0);
    }
    if let Some(student_id) = query.student_id {
        where_clause.push("student_id = ");
        where_clause.push_bind_unseparated(student_id.0);
    }
    if let Some(shop_id) = query.shop_id {
        where_clause.push("shop_id = ");
        where_clause.push_bind_unseparated(shop_id.0);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {} rows", orders.len());
    Ok(orders)
}

/// Applies a status transition guarded by the currently observed status. Returns `None` when no
/// row matched, i.e. another transaction moved the order first.
pub(crate) async fn update_status_checked(
    id: i64,
    from: OrderStatus,
    to: OrderStatus,
    actor_id: &str,
    reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, CanteenDbError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET
            status = $1,
            handled_by = $2,
            cancelled_reason = COALESCE($3, cancelled_reason),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4 AND status = $5
        RETURNING *
        "#,
    )
    .bind(to)
    .bind(actor_id)
    .bind(reason)
    .bind(id)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

pub(crate) async fn set_payment_status(
    id: i64,
    payment_status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, CanteenDbError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET payment_status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(payment_status)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| CanteenDbError::DatabaseError(format!("order row {id} disappeared mid-transaction")))
}

/// Replaces the item snapshot column (used when delivery flags flip). Prices never change here;
/// the snapshot the caller writes back derives from the one it read in the same transaction.
pub(crate) async fn update_items(
    id: i64,
    items_json: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, CanteenDbError> {
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET items = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(items_json)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    result.ok_or_else(|| CanteenDbError::DatabaseError(format!("order row {id} disappeared mid-transaction")))
}

pub(crate) async fn record_history(
    order_no: &OrderNo,
    from: Option<OrderStatus>,
    to: OrderStatus,
    actor_id: Option<&str>,
    reason: Option<&str>,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), CanteenDbError> {
    sqlx::query(
        r#"
        INSERT INTO order_status_history (order_no, from_status, to_status, actor_id, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(order_no)
    .bind(from)
    .bind(to)
    .bind(actor_id)
    .bind(reason)
    .bind(at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_history(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusChange>, AccountApiError> {
    let history = sqlx::query_as("SELECT * FROM order_status_history WHERE order_no = $1 ORDER BY id ASC")
        .bind(order_no)
        .fetch_all(conn)
        .await?;
    Ok(history)
}
