mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use storefront_api::entities::{Coupon, Order, OrderStatus, PaymentMethod, Product};
use storefront_api::services::carts::AddItemInput;
use storefront_api::services::orders::{CheckoutOutcome, CreateOrderInput, SettlementDisposition};
use storefront_api::services::payments::{WebhookEvent, CHECKOUT_SESSION_COMPLETED};

fn settlement_event(order_id: Option<Uuid>, event_type: &str) -> WebhookEvent {
    let mut payload = serde_json::json!({
        "id": "evt_test_1",
        "type": event_type,
        "data": {
            "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_test_1",
                "metadata": {}
            }
        }
    });
    if let Some(order_id) = order_id {
        payload["data"]["object"]["metadata"]["order_id"] =
            serde_json::Value::String(order_id.to_string());
    }
    serde_json::from_value(payload).unwrap()
}

/// Seeds a product, fills the cart, and creates a pending card order.
async fn pending_card_order(
    app: &TestApp,
    coupon_code: Option<&str>,
) -> (Uuid, Uuid, storefront_api::entities::OrderModel) {
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Club Hoodie", dec!(90), 10).await;
    app.services
        .carts
        .add_item(
            user_id,
            AddItemInput {
                product_id,
                size: "M".to_string(),
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let outcome = app
        .services
        .orders
        .create_order(
            user_id,
            CreateOrderInput {
                customer_name: "Sam Buyer".to_string(),
                phone: "+15550001111".to_string(),
                shipping_address: "2 Harbor Lane".to_string(),
                payment_method: PaymentMethod::Card,
                coupon_code: coupon_code.map(str::to_string),
                customer_email: None,
            },
        )
        .await
        .unwrap();

    let CheckoutOutcome::Card { order, .. } = outcome else {
        panic!("expected card outcome")
    };
    (user_id, product_id, order)
}

async fn stock_of(app: &TestApp, product_id: Uuid) -> i32 {
    Product::find_by_id(product_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
        .stock
}

#[tokio::test]
async fn settlement_marks_paid_decrements_stock_and_clears_cart() {
    let app = TestApp::new().await;
    let (user_id, product_id, order) = pending_card_order(&app, None).await;

    let disposition = app
        .services
        .orders
        .apply_webhook_event(settlement_event(Some(order.id), CHECKOUT_SESSION_COMPLETED))
        .await
        .unwrap();
    assert_matches!(disposition, SettlementDisposition::Settled(_));

    let settled = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert!(settled.paid);
    assert_eq!(settled.order_status, OrderStatus::Completed);
    assert_eq!(settled.payment_intent.as_deref(), Some("pi_test_1"));

    assert_eq!(stock_of(&app, product_id).await, 8);
    let cart = app.services.carts.view(user_id).await.unwrap();
    assert_eq!(cart.items_count, 0);
}

#[tokio::test]
async fn duplicate_delivery_settles_exactly_once() {
    let app = TestApp::new().await;
    let (_user_id, product_id, order) = pending_card_order(&app, None).await;
    let event = settlement_event(Some(order.id), CHECKOUT_SESSION_COMPLETED);

    let first = app
        .services
        .orders
        .apply_webhook_event(event.clone())
        .await
        .unwrap();
    assert_matches!(first, SettlementDisposition::Settled(_));

    // Redelivery finds no unpaid card order and must not touch anything.
    let second = app.services.orders.apply_webhook_event(event).await.unwrap();
    assert_matches!(second, SettlementDisposition::NoOp);

    assert_eq!(stock_of(&app, product_id).await, 8);
}

#[tokio::test]
async fn coupon_usage_advances_exactly_once_across_redeliveries() {
    let app = TestApp::new().await;
    let coupon_id = app
        .seed_coupon(
            "SETTLE10",
            storefront_api::entities::DiscountType::Percentage,
            dec!(10),
            100,
        )
        .await;
    let (_user_id, _product_id, order) = pending_card_order(&app, Some("SETTLE10")).await;
    let event = settlement_event(Some(order.id), CHECKOUT_SESSION_COMPLETED);

    app.services
        .orders
        .apply_webhook_event(event.clone())
        .await
        .unwrap();
    app.services.orders.apply_webhook_event(event).await.unwrap();

    let coupon = Coupon::find_by_id(coupon_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon.usage_count, 1);
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged_no_ops() {
    let app = TestApp::new().await;
    let (_user_id, product_id, order) = pending_card_order(&app, None).await;

    let disposition = app
        .services
        .orders
        .apply_webhook_event(settlement_event(Some(order.id), "invoice.created"))
        .await
        .unwrap();
    assert_matches!(disposition, SettlementDisposition::Ignored);

    let unchanged = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert!(!unchanged.paid);
    assert_eq!(unchanged.order_status, OrderStatus::Pending);
    assert_eq!(stock_of(&app, product_id).await, 10);
}

#[tokio::test]
async fn settlement_event_without_correlation_id_is_ignored() {
    let app = TestApp::new().await;
    let (_user_id, product_id, _order) = pending_card_order(&app, None).await;

    let disposition = app
        .services
        .orders
        .apply_webhook_event(settlement_event(None, CHECKOUT_SESSION_COMPLETED))
        .await
        .unwrap();
    assert_matches!(disposition, SettlementDisposition::Ignored);
    assert_eq!(stock_of(&app, product_id).await, 10);
}

#[tokio::test]
async fn settlement_for_unknown_order_is_a_no_op() {
    let app = TestApp::new().await;

    let disposition = app
        .services
        .orders
        .apply_webhook_event(settlement_event(
            Some(Uuid::new_v4()),
            CHECKOUT_SESSION_COMPLETED,
        ))
        .await
        .unwrap();
    assert_matches!(disposition, SettlementDisposition::NoOp);
}

#[tokio::test]
async fn admin_cancellation_beats_late_settlement() {
    let app = TestApp::new().await;
    let (_user_id, product_id, order) = pending_card_order(&app, None).await;

    app.services
        .orders
        .change_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();

    // The settlement precondition requires a pending order, so the earlier
    // cancellation wins and the late webhook becomes a no-op; a cancelled
    // order is never resurrected.
    let disposition = app
        .services
        .orders
        .apply_webhook_event(settlement_event(Some(order.id), CHECKOUT_SESSION_COMPLETED))
        .await
        .unwrap();
    assert_matches!(disposition, SettlementDisposition::NoOp);

    let unchanged = Order::find_by_id(order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert!(!unchanged.paid);
    assert_eq!(unchanged.order_status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&app, product_id).await, 10);
}
