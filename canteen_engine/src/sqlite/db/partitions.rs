//! Monthly ledger partitions.
//!
//! The wallet ledger is partitioned by the calendar month an entry was created in. The partition
//! name is a pure function of the creation instant, used identically for writes and for
//! range-query fan-out; the [`PartitionRegistry`] remembers which partition tables have already
//! been created so the hot posting path only issues DDL the first time a month is touched.
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Datelike, Utc};
use log::debug;
use sqlx::SqliteConnection;

pub const PARTITION_PREFIX: &str = "transactions";

/// The partition a transaction created at `at` belongs to, e.g. `transactions_2026_08`.
pub fn partition_for(at: DateTime<Utc>) -> String {
    format!("{PARTITION_PREFIX}_{}_{:02}", at.year(), at.month())
}

/// Every partition name a date range overlaps, oldest first. Partitions that were never written
/// do not exist as tables; callers intersect this with [`PartitionRegistry::existing`].
pub fn months_spanning(since: DateTime<Utc>, until: DateTime<Utc>) -> Vec<String> {
    let (mut year, mut month) = (since.year(), since.month());
    let (end_year, end_month) = (until.year(), until.month());
    let mut result = Vec::new();
    while year < end_year || (year == end_year && month <= end_month) {
        result.push(format!("{PARTITION_PREFIX}_{year}_{month:02}"));
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    result
}

/// Tracks which monthly partition tables exist, creating them on first use.
#[derive(Clone, Default)]
pub struct PartitionRegistry {
    known: Arc<Mutex<HashSet<String>>>,
}

impl PartitionRegistry {
    /// Makes sure the partition table exists. Cheap after the first call for a given month.
    /// The DDL is transactional in SQLite, so this is safe to call inside a posting transaction.
    pub async fn ensure(&self, partition: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        {
            let known = self.known.lock().unwrap_or_else(|e| e.into_inner());
            if known.contains(partition) {
                return Ok(());
            }
        }
        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS {partition} (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id     TEXT NOT NULL,
                entry_type     TEXT NOT NULL,
                amount         INTEGER NOT NULL,
                balance_before INTEGER NOT NULL,
                balance_after  INTEGER NOT NULL,
                description    TEXT NOT NULL,
                order_no       TEXT,
                actor_id       TEXT,
                metadata       TEXT,
                created_at     TEXT NOT NULL
            )"#
        );
        sqlx::query(&ddl).execute(&mut *conn).await?;
        let index = format!("CREATE INDEX IF NOT EXISTS idx_{partition}_student ON {partition} (student_id, created_at)");
        sqlx::query(&index).execute(&mut *conn).await?;
        debug!("🗃️ Ledger partition {partition} is ready");
        self.known.lock().unwrap_or_else(|e| e.into_inner()).insert(partition.to_string());
        Ok(())
    }

    /// The partition tables that actually exist in the store, oldest first.
    pub async fn existing(&self, conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'transactions\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(conn)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
