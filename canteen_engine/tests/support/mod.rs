#![allow(dead_code)]
//! Shared helpers for the integration tests: a throwaway SQLite database per test, plus seed
//! fixtures for the read models the engine does not own (students, shops, menu items).
use canteen_engine::{
    db_types::{LedgerEntryType, NewLedgerEntry, Order, StudentId},
    CanteenDatabase,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub async fn new_test_db() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let path = std::env::temp_dir().join(format!("canteen_test_{}.db", rand::random::<u64>()));
    let url = format!("sqlite://{}", path.display());
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(&url).await.expect("Error creating database");
    info!("🚀️ Created Sqlite database {url}");
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database")
}

pub fn sid(id: &str) -> StudentId {
    StudentId::from(id)
}

/// Seeds an active, approved student with a zero balance. Funds come in through the wallet API so
/// the ledger stays consistent with the cached balance.
pub async fn seed_student(db: &SqliteDatabase, id: &str, name: &str, department: &str, year: i64) {
    sqlx::query(
        "INSERT INTO students (id, name, department, year, active, approved, balance) VALUES ($1, $2, $3, $4, 1, 1, 0)",
    )
    .bind(id)
    .bind(name)
    .bind(department)
    .bind(year)
    .execute(db.pool())
    .await
    .expect("Error seeding student");
}

/// Seeds a student that exists but may not transact (inactive or unapproved).
pub async fn seed_ineligible_student(db: &SqliteDatabase, id: &str, name: &str, department: &str, year: i64) {
    sqlx::query(
        "INSERT INTO students (id, name, department, year, active, approved, balance) VALUES ($1, $2, $3, $4, 1, 0, 0)",
    )
    .bind(id)
    .bind(name)
    .bind(department)
    .bind(year)
    .execute(db.pool())
    .await
    .expect("Error seeding student");
}

pub async fn seed_shop(db: &SqliteDatabase, id: &str, name: &str, service: &str) {
    sqlx::query("INSERT INTO shops (id, name, service, active) VALUES ($1, $2, $3, 1)")
        .bind(id)
        .bind(name)
        .bind(service)
        .execute(db.pool())
        .await
        .expect("Error seeding shop");
}

pub async fn seed_menu_item(
    db: &SqliteDatabase,
    id: &str,
    shop_id: &str,
    name: &str,
    price: i64,
    offer_price: Option<i64>,
    available: bool,
) {
    sqlx::query(
        "INSERT INTO menu_items (id, shop_id, name, price, offer_price, available) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(shop_id)
    .bind(name)
    .bind(price)
    .bind(offer_price)
    .bind(available)
    .execute(db.pool())
    .await
    .expect("Error seeding menu item");
}

/// Models an order that was paid up-front (for example through an external gateway, or data
/// carried over from a charge-at-creation deployment): posts the debit and marks the order paid.
/// The cancellation refund path exists precisely for orders in this state.
pub async fn prepay_order(db: &SqliteDatabase, order: &Order) {
    let entry = NewLedgerEntry::new(
        order.student_id.clone(),
        LedgerEntryType::Debit,
        order.total,
        format!("Prepayment for order {}", order.order_no),
    )
    .for_order(order.order_no.clone());
    db.post_ledger_entry(entry).await.expect("Error posting prepayment debit");
    sqlx::query("UPDATE orders SET payment_status = 'paid' WHERE id = $1")
        .bind(order.id)
        .execute(db.pool())
        .await
        .expect("Error marking order paid");
}
