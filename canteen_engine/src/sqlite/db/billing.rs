use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Money, NewPaymentRequest, PaymentRequest, PaymentRequestStatus, PaymentSubmission, StudentId},
    traits::{AccountApiError, CanteenDbError},
};

pub(crate) async fn insert_request(
    request: &NewPaymentRequest,
    created_by: &str,
    target_count: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentRequest, CanteenDbError> {
    let selector = serde_json::to_string(&request.selector)
        .map_err(|e| CanteenDbError::Validation(format!("target selector could not be encoded: {e}")))?;
    let request: PaymentRequest = sqlx::query_as(
        r#"
        INSERT INTO payment_requests (
            title, description, amount, selector, total_target_count,
            created_by, due_date, show_on_dashboard, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        RETURNING *
        "#,
    )
    .bind(&request.title)
    .bind(&request.description)
    .bind(request.amount)
    .bind(selector)
    .bind(target_count)
    .bind(created_by)
    .bind(request.due_date)
    .bind(request.show_on_dashboard)
    .bind(at)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Payment request #{} inserted ({} targets)", request.id, request.total_target_count);
    Ok(request)
}

/// Creates one `pending` submission per target. Runs inside the request-creation transaction, so
/// readers see either the full fan-out or nothing.
pub(crate) async fn insert_submissions(
    request_id: i64,
    amount: Money,
    targets: &[StudentId],
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), CanteenDbError> {
    for student_id in targets {
        sqlx::query(
            r#"
            INSERT INTO payment_submissions (request_id, student_id, amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(request_id)
        .bind(student_id)
        .bind(amount)
        .bind(at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_request(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, AccountApiError> {
    let request =
        sqlx::query_as("SELECT * FROM payment_requests WHERE id = $1").bind(request_id).fetch_optional(conn).await?;
    Ok(request)
}

pub async fn fetch_submission(
    request_id: i64,
    student_id: &StudentId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentSubmission>, AccountApiError> {
    let submission =
        sqlx::query_as("SELECT * FROM payment_submissions WHERE request_id = $1 AND student_id = $2")
            .bind(request_id)
            .bind(student_id)
            .fetch_optional(conn)
            .await?;
    Ok(submission)
}

pub async fn submissions_for_request(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentSubmission>, AccountApiError> {
    let submissions =
        sqlx::query_as("SELECT * FROM payment_submissions WHERE request_id = $1 ORDER BY student_id ASC")
            .bind(request_id)
            .fetch_all(conn)
            .await?;
    Ok(submissions)
}

/// Flips a `pending` submission to `paid`. Returns `None` when the submission was no longer
/// pending — a retried or racing payment that must surface as `AlreadyPaid`, not a double charge.
pub(crate) async fn mark_submission_paid(
    id: i64,
    ledger_ref: &str,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentSubmission>, CanteenDbError> {
    let submission: Option<PaymentSubmission> = sqlx::query_as(
        r#"
        UPDATE payment_submissions SET
            status = 'paid',
            ledger_ref = $1,
            paid_at = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(ledger_ref)
    .bind(paid_at)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(submission)
}

/// Bumps the request's cached counters. Maintained only here and by [`close_request`]; nothing
/// else writes these columns.
pub(crate) async fn bump_request_counters(
    request_id: i64,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<PaymentRequest, CanteenDbError> {
    let request: Option<PaymentRequest> = sqlx::query_as(
        r#"
        UPDATE payment_requests SET
            paid_count = paid_count + 1,
            total_collected = total_collected + $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(amount)
    .bind(request_id)
    .fetch_optional(conn)
    .await?;
    request.ok_or_else(|| CanteenDbError::DatabaseError(format!("payment request {request_id} disappeared mid-transaction")))
}

/// Moves an `active` request to `closed` or `cancelled`. Returns `None` when the request was not
/// active any more.
pub(crate) async fn close_request(
    request_id: i64,
    status: PaymentRequestStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, CanteenDbError> {
    let request: Option<PaymentRequest> = sqlx::query_as(
        r#"
        UPDATE payment_requests SET status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(request_id)
    .fetch_optional(conn)
    .await?;
    Ok(request)
}
