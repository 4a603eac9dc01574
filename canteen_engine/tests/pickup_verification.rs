mod support;

use canteen_engine::{
    db_types::{Actor, Money, NewOrder, OrderStatus, ServiceType},
    events::EventProducers,
    helpers::{self, PickupPayload},
    CanteenDbError,
    OrderFlowApi,
    SqliteDatabase,
    WalletApi,
};

async fn ready_order(db: &SqliteDatabase, api: &OrderFlowApi<SqliteDatabase>) -> (String, canteen_engine::db_types::OrderNo) {
    support::seed_shop(db, "shop-main", "Main Canteen", "food").await;
    support::seed_shop(db, "shop-other", "North Canteen", "food").await;
    support::seed_menu_item(db, "item-dosa", "shop-main", "Masala Dosa", 150_00, None, true).await;
    support::seed_student(db, "s-100", "Asha Rao", "CSE", 2).await;
    WalletApi::new(db.clone())
        .deposit(&Actor::admin("admin-1"), &support::sid("s-100"), Money::from_rupees(500), "Wallet top-up")
        .await
        .unwrap();
    let placed = api
        .create_order(
            &Actor::student("s-100"),
            NewOrder::new(support::sid("s-100"), "shop-main".into(), ServiceType::Food).with_line("item-dosa".into(), 1),
        )
        .await
        .unwrap();
    let staff = Actor::staff("staff-7", "shop-main".into());
    api.update_status(&placed.order.order_no, OrderStatus::Preparing, &staff, None).await.unwrap();
    api.update_status(&placed.order.order_no, OrderStatus::Ready, &staff, None).await.unwrap();
    (placed.pickup_payload, placed.order.order_no)
}

#[tokio::test]
async fn a_valid_token_verifies_without_changing_anything() {
    let db = support::new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let (token, order_no) = ready_order(&db, &api).await;
    let staff = Actor::staff("staff-7", "shop-main".into());

    let order = api.verify_pickup(&token, &"shop-main".into(), &staff).await.unwrap();
    assert_eq!(order.order_no, order_no);
    // verification is read-only: still ready, still unpaid
    let order = api.fetch_order(&order_no).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Ready);

    // and it can be checked again before the explicit completion call
    api.verify_pickup(&token, &"shop-main".into(), &staff).await.unwrap();
}

#[tokio::test]
async fn a_token_presented_at_the_wrong_shop_is_rejected() {
    let db = support::new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let (token, _) = ready_order(&db, &api).await;
    let other_staff = Actor::staff("staff-9", "shop-other".into());

    let err = api.verify_pickup(&token, &"shop-other".into(), &other_staff).await.unwrap_err();
    assert!(matches!(err, CanteenDbError::ShopMismatch));
    assert_eq!(err.code(), "shop_mismatch");
}

#[tokio::test]
async fn a_tampered_credential_is_rejected() {
    let db = support::new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let (token, order_no) = ready_order(&db, &api).await;
    let staff = Actor::staff("staff-7", "shop-main".into());

    // re-encode the decoded payload with a forged credential
    let mut payload = helpers::decode(&token).unwrap();
    payload.pickup_token = "FORGED00".to_string();
    let forged = helpers::encode(&PickupPayload::new(
        order_no,
        payload.pickup_token,
        payload.shop_id,
        payload.timestamp,
    ));
    let err = api.verify_pickup(&forged, &"shop-main".into(), &staff).await.unwrap_err();
    assert!(matches!(err, CanteenDbError::TokenMismatch));
}

#[tokio::test]
async fn orders_that_are_not_ready_fail_verification() {
    let db = support::new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let (token, order_no) = ready_order(&db, &api).await;
    let staff = Actor::staff("staff-7", "shop-main".into());

    // complete the order; the token no longer grants anything
    api.update_status(&order_no, OrderStatus::Completed, &staff, None).await.unwrap();
    let err = api.verify_pickup(&token, &"shop-main".into(), &staff).await.unwrap_err();
    assert!(matches!(err, CanteenDbError::NotReady(OrderStatus::Completed)));
}

#[tokio::test]
async fn garbage_tokens_fail_validation_not_verification() {
    let db = support::new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let (_, _) = ready_order(&db, &api).await;
    let staff = Actor::staff("staff-7", "shop-main".into());

    for garbage in ["", "not-a-token", "%%%%"] {
        let err = api.verify_pickup(garbage, &"shop-main".into(), &staff).await.unwrap_err();
        assert!(matches!(err, CanteenDbError::Validation(_)), "expected Validation for {garbage:?}, got {err}");
        assert_eq!(err.code(), "validation");
    }
}
