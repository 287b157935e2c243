mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

use storefront_api::entities::{product, Product};
use storefront_api::errors::ServiceError;
use storefront_api::services::carts::AddItemInput;

fn add(product_id: Uuid, size: &str, quantity: i32) -> AddItemInput {
    AddItemInput {
        product_id,
        size: size.to_string(),
        quantity,
    }
}

#[tokio::test]
async fn absent_cart_yields_empty_view() {
    let app = TestApp::new().await;
    let view = app.services.carts.view(Uuid::new_v4()).await.unwrap();

    assert_eq!(view.cart_id, None);
    assert!(view.items.is_empty());
    assert_eq!(view.total, Decimal::ZERO);
    assert_eq!(view.items_count, 0);
}

#[tokio::test]
async fn first_add_creates_cart_lazily_and_snapshots_price() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app
        .seed_discounted_product("Home Jersey", dec!(200), dec!(10), 8)
        .await;

    let view = app
        .services
        .carts
        .add_item(user_id, add(product_id, "M", 2))
        .await
        .unwrap();

    assert!(view.cart_id.is_some());
    assert_eq!(view.items_count, 1);
    // Snapshot captures the effective (discounted) price.
    assert_eq!(view.items[0].unit_price, dec!(180));
    assert_eq!(view.total, dec!(360));
}

#[tokio::test]
async fn adding_same_product_and_size_merges_into_one_line() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Away Jersey", dec!(150), 10).await;

    app.services
        .carts
        .add_item(user_id, add(product_id, "L", 2))
        .await
        .unwrap();
    let view = app
        .services
        .carts
        .add_item(user_id, add(product_id, "L", 3))
        .await
        .unwrap();

    assert_eq!(view.items_count, 1);
    assert_eq!(view.items[0].quantity, 5);
}

#[tokio::test]
async fn different_size_gets_its_own_line() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Third Kit", dec!(120), 10).await;

    app.services
        .carts
        .add_item(user_id, add(product_id, "S", 1))
        .await
        .unwrap();
    let view = app
        .services
        .carts
        .add_item(user_id, add(product_id, "M", 1))
        .await
        .unwrap();

    assert_eq!(view.items_count, 2);
}

#[tokio::test]
async fn add_beyond_stock_is_rejected_and_cart_unchanged() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Rare Boots", dec!(300), 2).await;

    let err = app
        .services
        .carts
        .add_item(user_id, add(product_id, "42", 3))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let view = app.services.carts.view(user_id).await.unwrap();
    assert_eq!(view.items_count, 0);
}

#[tokio::test]
async fn merged_quantity_is_revalidated_against_stock() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Keeper Gloves", dec!(45), 4).await;

    app.services
        .carts
        .add_item(user_id, add(product_id, "9", 3))
        .await
        .unwrap();

    let err = app
        .services
        .carts
        .add_item(user_id, add(product_id, "9", 2))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let view = app.services.carts.view(user_id).await.unwrap();
    assert_eq!(view.items[0].quantity, 3);
}

#[tokio::test]
async fn snapshot_price_is_immune_to_later_catalog_changes() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Training Top", dec!(100), 10).await;

    app.services
        .carts
        .add_item(user_id, add(product_id, "M", 1))
        .await
        .unwrap();

    let existing = Product::find_by_id(product_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: product::ActiveModel = existing.into();
    active.price = Set(dec!(150));
    active.update(&*app.db).await.unwrap();

    let view = app.services.carts.view(user_id).await.unwrap();
    assert_eq!(view.items[0].unit_price, dec!(100));
    assert_eq!(view.total, dec!(100));
}

#[tokio::test]
async fn update_item_refreshes_snapshot_and_revalidates() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Track Pants", dec!(70), 5).await;

    let view = app
        .services
        .carts
        .add_item(user_id, add(product_id, "M", 1))
        .await
        .unwrap();
    let item_id = view.items[0].id;

    let existing = Product::find_by_id(product_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: product::ActiveModel = existing.into();
    active.price = Set(dec!(90));
    active.update(&*app.db).await.unwrap();

    let view = app
        .services
        .carts
        .update_item(user_id, item_id, 4)
        .await
        .unwrap();
    assert_eq!(view.items[0].quantity, 4);
    assert_eq!(view.items[0].unit_price, dec!(90));

    let err = app
        .services
        .carts
        .update_item(user_id, item_id, 6)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn remove_and_clear_empty_the_cart() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let a = app.seed_product("Socks", dec!(10), 10).await;
    let b = app.seed_product("Shin Guards", dec!(25), 10).await;

    let view = app
        .services
        .carts
        .add_item(user_id, add(a, "M", 1))
        .await
        .unwrap();
    let first_item = view.items[0].id;
    app.services
        .carts
        .add_item(user_id, add(b, "M", 2))
        .await
        .unwrap();

    let view = app
        .services
        .carts
        .remove_item(user_id, first_item)
        .await
        .unwrap();
    assert_eq!(view.items_count, 1);

    app.services.carts.clear(user_id).await.unwrap();
    let view = app.services.carts.view(user_id).await.unwrap();
    assert_eq!(view.items_count, 0);
    assert_eq!(view.total, Decimal::ZERO);
}

#[tokio::test]
async fn removing_unknown_line_is_not_found() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product_id = app.seed_product("Cap", dec!(15), 5).await;

    app.services
        .carts
        .add_item(user_id, add(product_id, "M", 1))
        .await
        .unwrap();

    let err = app
        .services
        .carts
        .remove_item(user_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
