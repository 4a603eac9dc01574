//! Hand-written row decoders.
//!
//! Orders, ledger entries and payment requests keep their structured parts (item snapshots,
//! service details, metadata, target selectors) in JSON text columns, so their `FromRow` impls
//! are written out instead of derived. A JSON column that fails to parse surfaces as a column
//! decode error, exactly like any other bad column.
use serde::de::DeserializeOwned;
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::db_types::{LedgerEntry, Order, PaymentRequest, Secret};

fn decode_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(raw)
        .map_err(|e| sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) })
}

fn decode_json_opt<T: DeserializeOwned>(column: &str, raw: Option<String>) -> Result<Option<T>, sqlx::Error> {
    raw.map(|raw| decode_json(column, &raw)).transpose()
}

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let items: String = row.try_get("items")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_no: row.try_get("order_no")?,
            student_id: row.try_get("student_id")?,
            shop_id: row.try_get("shop_id")?,
            service: row.try_get("service")?,
            details: decode_json_opt("details", row.try_get("details")?)?,
            items: decode_json("items", &items)?,
            total: row.try_get("total")?,
            status: row.try_get("status")?,
            payment_status: row.try_get("payment_status")?,
            pickup_code: Secret::new(row.try_get("pickup_code")?),
            handled_by: row.try_get("handled_by")?,
            cancelled_reason: row.try_get("cancelled_reason")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for LedgerEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            // queries alias the partition table name into the result set
            partition: row.try_get("partition")?,
            student_id: row.try_get("student_id")?,
            entry_type: row.try_get("entry_type")?,
            amount: row.try_get("amount")?,
            balance_before: row.try_get("balance_before")?,
            balance_after: row.try_get("balance_after")?,
            description: row.try_get("description")?,
            order_no: row.try_get("order_no")?,
            actor_id: row.try_get("actor_id")?,
            metadata: decode_json_opt("metadata", row.try_get("metadata")?)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for PaymentRequest {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let selector: String = row.try_get("selector")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            amount: row.try_get("amount")?,
            selector: decode_json("selector", &selector)?,
            status: row.try_get("status")?,
            total_target_count: row.try_get("total_target_count")?,
            paid_count: row.try_get("paid_count")?,
            total_collected: row.try_get("total_collected")?,
            created_by: row.try_get("created_by")?,
            due_date: row.try_get("due_date")?,
            show_on_dashboard: row.try_get("show_on_dashboard")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
