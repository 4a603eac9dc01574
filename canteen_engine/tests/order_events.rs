mod support;

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use canteen_engine::{
    db_types::{Actor, Money, NewOrder, OrderStatus, ServiceType},
    events::{EventHandlers, EventHooks},
    OrderFlowApi,
    WalletApi,
};

fn counting<E>(
    counter: Arc<AtomicUsize>,
) -> impl Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    move |_event| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    }
}

#[tokio::test]
async fn committed_transitions_reach_the_subscribers() {
    let db = support::new_test_db().await;
    support::seed_shop(&db, "shop-main", "Main Canteen", "food").await;
    support::seed_menu_item(&db, "item-dosa", "shop-main", "Masala Dosa", 150_00, None, true).await;
    support::seed_student(&db, "s-100", "Asha Rao", "CSE", 2).await;
    WalletApi::new(db.clone())
        .deposit(&Actor::admin("admin-1"), &support::sid("s-100"), Money::from_rupees(500), "Top-up")
        .await
        .unwrap();

    let new_orders = Arc::new(AtomicUsize::new(0));
    let status_changes = Arc::new(AtomicUsize::new(0));
    let ready = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));
    let mut hooks = EventHooks::default();
    hooks.on_new_order(counting(new_orders.clone()));
    hooks.on_status_changed(counting(status_changes.clone()));
    hooks.on_order_ready(counting(ready.clone()));
    hooks.on_order_cancelled(counting(cancelled.clone()));
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = OrderFlowApi::new(db.clone(), producers);
    let staff = Actor::staff("staff-7", "shop-main".into());
    let placed = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 1),
        )
        .await
        .unwrap();
    let order_no = placed.order.order_no.clone();
    api.update_status(&order_no, OrderStatus::Preparing, &staff, None).await.unwrap();
    api.update_status(&order_no, OrderStatus::Ready, &staff, None).await.unwrap();
    api.update_status(&order_no, OrderStatus::Cancelled, &staff, Some("spill".to_string())).await.unwrap();

    // delivery is best-effort and async; give the handler tasks a moment to drain
    for _ in 0..100 {
        if new_orders.load(Ordering::SeqCst) == 1
            && status_changes.load(Ordering::SeqCst) == 3
            && ready.load(Ordering::SeqCst) == 1
            && cancelled.load(Ordering::SeqCst) == 1
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(new_orders.load(Ordering::SeqCst), 1);
    assert_eq!(status_changes.load(Ordering::SeqCst), 3);
    assert_eq!(ready.load(Ordering::SeqCst), 1);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}
