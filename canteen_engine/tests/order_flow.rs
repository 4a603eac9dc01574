mod support;

use canteen_engine::{
    db_types::{
        Actor,
        LedgerEntryType,
        Money,
        NewOrder,
        OrderStatus,
        PaymentStatus,
        ServiceType,
    },
    events::EventProducers,
    ledger_objects::LedgerQueryFilter,
    CanteenDbError,
    OrderFlowApi,
    SqliteDatabase,
    WalletApi,
};

async fn canteen_fixture(db: &SqliteDatabase) {
    support::seed_shop(db, "shop-main", "Main Canteen", "food").await;
    support::seed_menu_item(db, "item-dosa", "shop-main", "Masala Dosa", 150_00, None, true).await;
    support::seed_menu_item(db, "item-thali", "shop-main", "Veg Thali", 90_00, Some(75_00), true).await;
    support::seed_menu_item(db, "item-halwa", "shop-main", "Halwa", 40_00, None, false).await;
    support::seed_student(db, "s-100", "Asha Rao", "CSE", 2).await;
}

async fn top_up(db: &SqliteDatabase, student: &str, rupees: i64) {
    let wallet = WalletApi::new(db.clone());
    wallet
        .deposit(&Actor::admin("admin-1"), &support::sid(student), Money::from_rupees(rupees), "Wallet top-up")
        .await
        .expect("Error crediting wallet");
}

#[tokio::test]
async fn completing_an_order_debits_the_wallet_once() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let wallet = WalletApi::new(db.clone());

    let order = NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
        .with_line("item-dosa".into(), 2)
        .with_notes("less spicy");
    let placed = api.create_order(&Actor::student("s-100"), order).await.unwrap();
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.payment_status, PaymentStatus::Pending);
    assert_eq!(placed.order.total, Money::from_rupees(300));
    // nothing is charged at creation
    assert_eq!(wallet.balance(&support::sid("s-100")).await.unwrap(), Some(Money::from_rupees(500)));

    let staff = Actor::staff("staff-7", "shop-main".into());
    let order_no = placed.order.order_no.clone();
    api.update_status(&order_no, OrderStatus::Preparing, &staff, None).await.unwrap();
    api.update_status(&order_no, OrderStatus::Ready, &staff, None).await.unwrap();
    let done = api.update_status(&order_no, OrderStatus::Completed, &staff, None).await.unwrap();

    assert_eq!(done.order.status, OrderStatus::Completed);
    assert_eq!(done.order.payment_status, PaymentStatus::Paid);
    let entry = done.ledger_entry.expect("completion should post a debit");
    assert_eq!(entry.entry_type, LedgerEntryType::Debit);
    assert_eq!(entry.amount, Money::from_rupees(300));
    assert_eq!(wallet.balance(&support::sid("s-100")).await.unwrap(), Some(Money::from_rupees(200)));

    // exactly one ledger entry references this order
    let entries = wallet
        .history(&support::sid("s-100"), LedgerQueryFilter::default().with_order_no(order_no.clone()))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);

    // the realized history is a valid walk from pending to a terminal state
    let history = api.order_history(&order_no).await.unwrap();
    let walk: Vec<_> = history.iter().map(|h| h.to_status).collect();
    assert_eq!(walk, vec![
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed
    ]);
    assert_eq!(history[0].from_status, None);
    assert_eq!(history[3].from_status, Some(OrderStatus::Ready));
}

#[tokio::test]
async fn cancelling_a_paid_order_refunds_the_full_amount() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let wallet = WalletApi::new(db.clone());

    let order = NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
        .with_line("item-dosa".into(), 2);
    let placed = api.create_order(&Actor::student("s-100"), order).await.unwrap();
    support::prepay_order(&db, &placed.order).await;
    assert_eq!(wallet.balance(&support::sid("s-100")).await.unwrap(), Some(Money::from_rupees(200)));

    let staff = Actor::staff("staff-7", "shop-main".into());
    let order_no = placed.order.order_no.clone();
    api.update_status(&order_no, OrderStatus::Preparing, &staff, None).await.unwrap();
    let cancelled = api
        .update_status(&order_no, OrderStatus::Cancelled, &staff, Some("out of stock".to_string()))
        .await
        .unwrap();

    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.order.payment_status, PaymentStatus::Refunded);
    assert_eq!(cancelled.order.cancelled_reason.as_deref(), Some("out of stock"));
    let refund = cancelled.ledger_entry.expect("cancelling a paid order should post a refund");
    assert_eq!(refund.entry_type, LedgerEntryType::Refund);
    assert_eq!(refund.amount, Money::from_rupees(300));
    assert_eq!(wallet.balance(&support::sid("s-100")).await.unwrap(), Some(Money::from_rupees(500)));

    // exactly one debit and one refund of equal amount reference the order
    let entries = wallet
        .history(&support::sid("s-100"), LedgerQueryFilter::default().with_order_no(order_no))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    let debit = entries.iter().find(|e| e.entry_type == LedgerEntryType::Debit).unwrap();
    let refund = entries.iter().find(|e| e.entry_type == LedgerEntryType::Refund).unwrap();
    assert_eq!(debit.amount, refund.amount);
}

#[tokio::test]
async fn cancelling_an_unpaid_order_moves_no_money() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let wallet = WalletApi::new(db.clone());

    let order = NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
        .with_line("item-dosa".into(), 1);
    let placed = api.create_order(&Actor::student("s-100"), order).await.unwrap();
    let staff = Actor::staff("staff-7", "shop-main".into());
    let cancelled = api
        .update_status(&placed.order.order_no, OrderStatus::Cancelled, &staff, None)
        .await
        .unwrap();
    assert!(cancelled.ledger_entry.is_none());
    assert_eq!(cancelled.order.payment_status, PaymentStatus::Pending);
    assert_eq!(wallet.balance(&support::sid("s-100")).await.unwrap(), Some(Money::from_rupees(500)));
}

#[tokio::test]
async fn completion_recheck_catches_a_drained_balance() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 300).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let wallet = WalletApi::new(db.clone());
    let staff = Actor::staff("staff-7", "shop-main".into());

    // two orders of 300 each pass the creation check against the same 300 balance
    let first = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 2),
        )
        .await
        .unwrap();
    let second = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 2),
        )
        .await
        .unwrap();

    for order_no in [&first.order.order_no, &second.order.order_no] {
        api.update_status(order_no, OrderStatus::Preparing, &staff, None).await.unwrap();
        api.update_status(order_no, OrderStatus::Ready, &staff, None).await.unwrap();
    }
    api.update_status(&first.order.order_no, OrderStatus::Completed, &staff, None).await.unwrap();
    assert_eq!(wallet.balance(&support::sid("s-100")).await.unwrap(), Some(Money::from_rupees(0)));

    let err = api
        .update_status(&second.order.order_no, OrderStatus::Completed, &staff, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CanteenDbError::InsufficientBalanceOnCompletion { .. }), "got {err}");

    // the failed transition was not applied, and no debit leaked
    let untouched = api.fetch_order(&second.order.order_no).await.unwrap().unwrap();
    assert_eq!(untouched.status, OrderStatus::Ready);
    assert_eq!(untouched.payment_status, PaymentStatus::Pending);
    let entries = wallet
        .history(
            &support::sid("s-100"),
            LedgerQueryFilter::default().with_order_no(second.order.order_no.clone()),
        )
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn creation_rejects_orders_the_balance_cannot_cover() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 100).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let order = NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
        .with_line("item-dosa".into(), 2);
    let err = api.create_order(&Actor::student("s-100"), order).await.unwrap_err();
    assert!(matches!(
        err,
        CanteenDbError::InsufficientBalance { required, available }
            if required == Money::from_rupees(300) && available == Money::from_rupees(100)
    ));
}

#[tokio::test]
async fn unavailable_and_unknown_items_are_reported_by_name() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let order = NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
        .with_line("item-halwa".into(), 1)
        .with_line("item-bogus".into(), 1)
        .with_line("item-dosa".into(), 1);
    let err = api.create_order(&Actor::student("s-100"), order).await.unwrap_err();
    match err {
        CanteenDbError::ItemsUnavailable(names) => {
            assert!(names.contains(&"Halwa".to_string()));
            assert!(names.contains(&"item-bogus".to_string()));
            assert_eq!(names.len(), 2);
        },
        other => panic!("expected ItemsUnavailable, got {other}"),
    }
}

#[tokio::test]
async fn offer_prices_are_used_and_frozen_at_creation() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let order = NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
        .with_line("item-thali".into(), 2);
    let placed = api.create_order(&Actor::student("s-100"), order).await.unwrap();
    // offer price 75 wins over list price 90
    assert_eq!(placed.order.total, Money::from_rupees(150));
    assert_eq!(placed.order.items[0].unit_price, Money::from_rupees(90));
    assert_eq!(placed.order.items[0].offer_price, Some(Money::from_rupees(75)));

    // a later catalog price change never reaches back into the snapshot
    sqlx::query("UPDATE menu_items SET price = 99900, offer_price = NULL WHERE id = 'item-thali'")
        .execute(db.pool())
        .await
        .unwrap();
    let refetched = api.fetch_order(&placed.order.order_no).await.unwrap().unwrap();
    assert_eq!(refetched.total, Money::from_rupees(150));
    assert_eq!(refetched.items[0].subtotal, Money::from_rupees(150));
}

#[tokio::test]
async fn order_numbers_are_date_prefixed_and_sequential() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let mut numbers = vec![];
    for _ in 0..2 {
        let order = NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
            .with_line("item-dosa".into(), 1);
        let placed = api.create_order(&Actor::student("s-100"), order).await.unwrap();
        numbers.push(placed.order.order_no.as_str().to_string());
    }
    let (day_a, seq_a) = numbers[0].split_once('-').unwrap();
    let (day_b, seq_b) = numbers[1].split_once('-').unwrap();
    assert_eq!(day_a.len(), 8);
    assert_eq!(day_a, day_b);
    assert_eq!(seq_a.parse::<i64>().unwrap() + 1, seq_b.parse::<i64>().unwrap());
}

#[tokio::test]
async fn invalid_transitions_are_rejected() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let staff = Actor::staff("staff-7", "shop-main".into());

    let placed = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 1),
        )
        .await
        .unwrap();
    let err = api
        .update_status(&placed.order.order_no, OrderStatus::Completed, &staff, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CanteenDbError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Completed }
    ));

    // terminal states stay terminal
    api.update_status(&placed.order.order_no, OrderStatus::Cancelled, &staff, None).await.unwrap();
    let err = api
        .update_status(&placed.order.order_no, OrderStatus::Preparing, &staff, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CanteenDbError::InvalidTransition { .. }));
}

#[tokio::test]
async fn owners_may_cancel_only_their_own_pending_orders() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    support::seed_student(&db, "s-200", "Vikram Iyer", "ECE", 3).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let staff = Actor::staff("staff-7", "shop-main".into());

    let placed = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 1),
        )
        .await
        .unwrap();

    // someone else's order
    let err = api.cancel_by_owner(&placed.order.order_no, &support::sid("s-200"), None).await.unwrap_err();
    assert!(matches!(err, CanteenDbError::Forbidden(_)));

    // once preparing, the owner can no longer withdraw it
    api.update_status(&placed.order.order_no, OrderStatus::Preparing, &staff, None).await.unwrap();
    let err = api
        .cancel_by_owner(&placed.order.order_no, &support::sid("s-100"), Some("changed my mind".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, CanteenDbError::PreconditionFailed(_)));

    // a fresh pending order cancels fine
    let placed = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 1),
        )
        .await
        .unwrap();
    let cancelled = api
        .cancel_by_owner(&placed.order.order_no, &support::sid("s-100"), Some("changed my mind".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.order.cancelled_reason.as_deref(), Some("changed my mind"));
}

#[tokio::test]
async fn staff_of_another_shop_may_not_advance_the_order() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    support::seed_shop(&db, "shop-laundry", "Campus Laundry", "laundry").await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let placed = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 1),
        )
        .await
        .unwrap();
    let outsider = Actor::staff("staff-9", "shop-laundry".into());
    let err = api.update_status(&placed.order.order_no, OrderStatus::Preparing, &outsider, None).await.unwrap_err();
    assert!(matches!(err, CanteenDbError::Forbidden(_)));
}

#[tokio::test]
async fn partial_delivery_flips_flags_and_status() {
    let db = support::new_test_db().await;
    canteen_fixture(&db).await;
    top_up(&db, "s-100", 500).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let staff = Actor::staff("staff-7", "shop-main".into());

    let placed = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food)
                .with_line("item-dosa".into(), 1)
                .with_line("item-thali".into(), 1),
        )
        .await
        .unwrap();
    let order_no = placed.order.order_no.clone();
    api.update_status(&order_no, OrderStatus::Preparing, &staff, None).await.unwrap();
    api.update_status(&order_no, OrderStatus::Ready, &staff, None).await.unwrap();

    let updated = api.record_item_delivery(&order_no, &["item-dosa".into()], &staff).await.unwrap();
    assert_eq!(updated.status, OrderStatus::PartiallyDelivered);
    assert!(updated.items.iter().find(|i| i.item_id.as_str() == "item-dosa").unwrap().delivered);
    assert!(!updated.items.iter().find(|i| i.item_id.as_str() == "item-thali").unwrap().delivered);
    assert!(!updated.all_items_delivered());

    // completion stays a separate, explicit call, and still posts the debit
    let done = api.update_status(&order_no, OrderStatus::Completed, &staff, None).await.unwrap();
    assert_eq!(done.order.payment_status, PaymentStatus::Paid);
    assert!(done.ledger_entry.is_some());
}
