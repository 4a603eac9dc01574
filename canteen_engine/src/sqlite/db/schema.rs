//! Schema bootstrap.
//!
//! All DDL is idempotent and runs when a [`SqliteDatabase`](crate::sqlite::SqliteDatabase) is
//! created. The ledger's monthly partition tables are not listed here — they are created on
//! demand by the [`partitions`](super::partitions) registry as entries land in new months.
use sqlx::SqliteConnection;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS students (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        department  TEXT NOT NULL,
        year        INTEGER NOT NULL,
        active      INTEGER NOT NULL DEFAULT 1,
        approved    INTEGER NOT NULL DEFAULT 0,
        balance     INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS shops (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        service     TEXT NOT NULL DEFAULT 'food',
        active      INTEGER NOT NULL DEFAULT 1,
        created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS menu_items (
        id          TEXT PRIMARY KEY,
        shop_id     TEXT NOT NULL REFERENCES shops (id),
        name        TEXT NOT NULL,
        price       INTEGER NOT NULL,
        offer_price INTEGER,
        image       TEXT,
        available   INTEGER NOT NULL DEFAULT 1,
        created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_menu_items_shop ON menu_items (shop_id)",
    r#"CREATE TABLE IF NOT EXISTS orders (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        order_no         TEXT NOT NULL UNIQUE,
        student_id       TEXT NOT NULL REFERENCES students (id),
        shop_id          TEXT NOT NULL REFERENCES shops (id),
        service          TEXT NOT NULL,
        details          TEXT,
        items            TEXT NOT NULL,
        total            INTEGER NOT NULL,
        status           TEXT NOT NULL DEFAULT 'pending',
        payment_status   TEXT NOT NULL DEFAULT 'pending',
        pickup_code      TEXT NOT NULL,
        handled_by       TEXT,
        cancelled_reason TEXT,
        notes            TEXT,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_orders_student ON orders (student_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_orders_shop_status ON orders (shop_id, status)",
    r#"CREATE TABLE IF NOT EXISTS order_status_history (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        order_no    TEXT NOT NULL,
        from_status TEXT,
        to_status   TEXT NOT NULL,
        actor_id    TEXT,
        reason      TEXT,
        created_at  TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_order_status_history_order ON order_status_history (order_no)",
    r#"CREATE TABLE IF NOT EXISTS order_sequences (
        day      TEXT PRIMARY KEY,
        last_seq INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS payment_requests (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        title              TEXT NOT NULL,
        description        TEXT NOT NULL DEFAULT '',
        amount             INTEGER NOT NULL,
        selector           TEXT NOT NULL,
        status             TEXT NOT NULL DEFAULT 'active',
        total_target_count INTEGER NOT NULL DEFAULT 0,
        paid_count         INTEGER NOT NULL DEFAULT 0,
        total_collected    INTEGER NOT NULL DEFAULT 0,
        created_by         TEXT NOT NULL,
        due_date           TEXT,
        show_on_dashboard  INTEGER NOT NULL DEFAULT 1,
        created_at         TEXT NOT NULL,
        updated_at         TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS payment_submissions (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id INTEGER NOT NULL REFERENCES payment_requests (id),
        student_id TEXT NOT NULL REFERENCES students (id),
        status     TEXT NOT NULL DEFAULT 'pending',
        amount     INTEGER NOT NULL,
        ledger_ref TEXT,
        paid_at    TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (request_id, student_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_payment_submissions_student ON payment_submissions (student_id)",
];

pub async fn create_schema(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}
