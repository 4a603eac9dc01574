mod support;

use chrono::{Duration, Utc};

use canteen_engine::{
    db_types::{Actor, Money, NewOrder, OrderStatus, ServiceType},
    events::EventProducers,
    OrderFlowApi,
    ShopAnalyticsApi,
    SqliteDatabase,
    WalletApi,
};

async fn complete_order(api: &OrderFlowApi<SqliteDatabase>, staff: &Actor, student: &str, item: &str, qty: i64) {
    let placed = api
        .create_order(
            &Actor::student(student),
            NewOrder::new(support::sid(student), "shop-main".into(), ServiceType::Food).with_line(item.into(), qty),
        )
        .await
        .unwrap();
    let order_no = placed.order.order_no.clone();
    api.update_status(&order_no, OrderStatus::Preparing, staff, None).await.unwrap();
    api.update_status(&order_no, OrderStatus::Ready, staff, None).await.unwrap();
    api.update_status(&order_no, OrderStatus::Completed, staff, None).await.unwrap();
}

#[tokio::test]
async fn rollups_only_count_completed_orders() {
    let db = support::new_test_db().await;
    support::seed_shop(&db, "shop-main", "Main Canteen", "food").await;
    support::seed_menu_item(&db, "item-dosa", "shop-main", "Masala Dosa", 150_00, None, true).await;
    support::seed_menu_item(&db, "item-thali", "shop-main", "Veg Thali", 90_00, None, true).await;
    support::seed_student(&db, "s-100", "Asha Rao", "CSE", 2).await;
    support::seed_student(&db, "s-200", "Vikram Iyer", "ECE", 3).await;
    let wallet = WalletApi::new(db.clone());
    let admin = Actor::admin("admin-1");
    for id in ["s-100", "s-200"] {
        wallet.deposit(&admin, &support::sid(id), Money::from_rupees(1000), "Top-up").await.unwrap();
    }

    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let staff = Actor::staff("staff-7", "shop-main".into());
    complete_order(&api, &staff, "s-100", "item-dosa", 1).await;
    complete_order(&api, &staff, "s-100", "item-thali", 2).await;
    complete_order(&api, &staff, "s-200", "item-dosa", 1).await;

    // one more order that never completes, and so never counts
    let placed = api
        .create_order(
            &Actor::student("s-200"),
            NewOrder::new(support::sid("s-200"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 3),
        )
        .await
        .unwrap();
    api.update_status(&placed.order.order_no, OrderStatus::Cancelled, &staff, None).await.unwrap();

    let analytics = ShopAnalyticsApi::new(db.clone());
    let since = Utc::now() - Duration::hours(1);
    let until = Utc::now() + Duration::hours(1);
    let summary = analytics.sales_summary(&"shop-main".into(), since, until).await.unwrap();
    assert_eq!(summary.orders_completed, 3);
    // 150 + 180 + 150
    assert_eq!(summary.gross_revenue, Money::from_rupees(480));
    assert_eq!(summary.distinct_students, 2);

    let daily = analytics.daily_sales(&"shop-main".into(), since, until).await.unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].orders_completed, 3);
    assert_eq!(daily[0].gross_revenue, Money::from_rupees(480));
}
