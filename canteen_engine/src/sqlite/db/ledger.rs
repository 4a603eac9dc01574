use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::ledger_objects::LedgerQueryFilter,
    db_types::{LedgerEntry, Money, NewLedgerEntry, StudentId},
    sqlite::db::{partitions::partition_for, students},
    traits::{AccountApiError, CanteenDbError},
};

/// Appends a ledger entry to the partition for `at` and writes the student's new cached balance,
/// all through the caller's connection — callers run this inside the transaction that carries the
/// rest of the operation.
///
/// The partition table for `at` must already exist: `SqliteDatabase` ensures it on an autocommit
/// connection before opening the transaction, so a rollback here can never take the table (or
/// the registry's view of it) with it.
///
/// The `balance_before` snapshot is the balance read through that same connection, so two
/// concurrent postings for one student cannot both build on the same stale value: the second
/// transaction either serialises behind the first or aborts with a retryable conflict.
pub(crate) async fn post_with_balance(
    entry: NewLedgerEntry,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, CanteenDbError> {
    if !entry.amount.is_positive() {
        return Err(CanteenDbError::Validation(format!(
            "ledger amounts must be positive, got {}",
            entry.amount
        )));
    }
    let student = students::fetch_student(&entry.student_id, &mut *conn)
        .await?
        .ok_or_else(|| CanteenDbError::StudentNotFound(entry.student_id.clone()))?;
    let balance_before = student.balance;
    let balance_after = balance_before + entry.entry_type.signed(entry.amount);
    if balance_after.value() < 0 {
        return Err(CanteenDbError::InsufficientBalance { required: entry.amount, available: balance_before });
    }

    let partition = partition_for(at);
    let metadata_json = entry.metadata.as_ref().map(|m| m.to_string());
    let insert = format!(
        r#"
        INSERT INTO {partition} (
            student_id, entry_type, amount, balance_before, balance_after,
            description, order_no, actor_id, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#
    );
    let (id,): (i64,) = sqlx::query_as(&insert)
        .bind(&entry.student_id)
        .bind(entry.entry_type)
        .bind(entry.amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(&entry.description)
        .bind(&entry.order_no)
        .bind(&entry.actor_id)
        .bind(&metadata_json)
        .bind(at)
        .fetch_one(&mut *conn)
        .await?;
    students::set_balance(&entry.student_id, balance_after, conn).await?;
    debug!(
        "🧾 {} of {} posted for {} ({} -> {})",
        entry.entry_type, entry.amount, entry.student_id, balance_before, balance_after
    );
    Ok(LedgerEntry {
        id,
        partition,
        student_id: entry.student_id,
        entry_type: entry.entry_type,
        amount: entry.amount,
        balance_before,
        balance_after,
        description: entry.description,
        order_no: entry.order_no,
        actor_id: entry.actor_id,
        metadata: entry.metadata,
        created_at: at,
    })
}

/// Queries one partition for a student's entries, newest first. The partition name is aliased
/// into the result set so merged results keep a stable reference to their origin.
pub async fn entries_in_partition(
    partition: &str,
    student_id: &StudentId,
    filter: &LedgerQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, AccountApiError> {
    // "partition" is a SQLite keyword, so the alias is quoted
    let mut builder =
        QueryBuilder::new(format!(r#"SELECT *, '{partition}' AS "partition" FROM {partition} WHERE student_id = "#));
    builder.push_bind(student_id.as_str());
    if let Some(entry_type) = filter.entry_type {
        builder.push(" AND entry_type = ");
        builder.push_bind(entry_type.to_string());
    }
    if let Some(order_no) = &filter.order_no {
        builder.push(" AND order_no = ");
        builder.push_bind(order_no.as_str());
    }
    if let Some(since) = filter.since {
        builder.push(" AND created_at >= ");
        builder.push_bind(since);
    }
    if let Some(until) = filter.until {
        builder.push(" AND created_at <= ");
        builder.push_bind(until);
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    let entries = builder.build_query_as::<LedgerEntry>().fetch_all(conn).await?;
    Ok(entries)
}

/// Sums credits + refunds − debits for a student within one partition. Used by reconciliation.
pub async fn replay_in_partition(
    partition: &str,
    student_id: &StudentId,
    conn: &mut SqliteConnection,
) -> Result<(Money, i64), AccountApiError> {
    let sum_sql = format!(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN entry_type = 'debit' THEN -amount ELSE amount END), 0),
            COUNT(*)
        FROM {partition}
        WHERE student_id = $1
        "#
    );
    let (sum, count): (i64, i64) = sqlx::query_as(&sum_sql).bind(student_id).fetch_one(conn).await?;
    Ok((Money::from(sum), count))
}
