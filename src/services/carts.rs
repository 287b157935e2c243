//! Cart aggregate: per-user line items with add-time price snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{cart, cart_item, Cart, CartItem, CartModel, ProductModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::catalog::CatalogService;
use crate::services::stock::StockService;

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    catalog: CatalogService,
}

#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    #[serde(default)]
    pub size: String,
    pub quantity: i32,
}

/// One enriched cart line as returned to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub size: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub stock: i32,
}

/// Cart view: enriched lines plus computed totals. An absent cart yields
/// the empty view rather than an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart_id: Option<Uuid>,
    pub user_id: Uuid,
    pub items: Vec<CartLineView>,
    pub total: Decimal,
    pub items_count: usize,
}

impl CartView {
    fn empty(user_id: Uuid) -> Self {
        Self {
            cart_id: None,
            user_id,
            items: Vec::new(),
            total: Decimal::ZERO,
            items_count: 0,
        }
    }
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        catalog: CatalogService,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
        }
    }

    async fn find_cart(&self, user_id: Uuid) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    /// Returns the user's cart, creating it lazily on first use.
    async fn find_or_create_cart(&self, user_id: Uuid) -> Result<CartModel, ServiceError> {
        if let Some(existing) = self.find_cart(user_id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&*self.db).await?)
    }

    /// Adds `quantity` of a product/size to the cart. An existing line for
    /// the same `(product_id, size)` is merged by an increment scoped to
    /// that line; a new line snapshots the product's current effective
    /// price. Availability is checked against the merged quantity.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = self.catalog.get_product(input.product_id).await?;
        if !StockService::check_availability(&product, input.quantity) {
            return Err(out_of_stock(&product));
        }

        let cart = self.find_or_create_cart(user_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(cart_item::Column::Size.eq(input.size.clone()))
            .one(&*self.db)
            .await?;

        if let Some(line) = existing {
            let merged = line.quantity + input.quantity;
            if !StockService::check_availability(&product, merged) {
                return Err(out_of_stock(&product));
            }
            // Increment scoped to the matching line, not a blind overwrite.
            CartItem::update_many()
                .col_expr(
                    cart_item::Column::Quantity,
                    Expr::col(cart_item::Column::Quantity).add(input.quantity),
                )
                .col_expr(cart_item::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(cart_item::Column::Id.eq(line.id))
                .exec(&*self.db)
                .await?;
        } else {
            let now = Utc::now();
            let line = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                size: Set(input.size.clone()),
                quantity: Set(input.quantity),
                unit_price: Set(product.final_price()),
                created_at: Set(now),
                updated_at: Set(now),
            };
            line.insert(&*self.db).await?;
        }

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(cart_id = %cart.id, product_id = %input.product_id, quantity = input.quantity, "Added item to cart");
        self.view(user_id).await
    }

    /// Sets a line to a new absolute quantity, re-validating availability
    /// and refreshing the price snapshot from the live product.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let cart = self
            .find_cart(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let line = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;

        let product = self.catalog.get_product(line.product_id).await?;
        if !StockService::check_availability(&product, quantity) {
            return Err(out_of_stock(&product));
        }

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.unit_price = Set(product.final_price());
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                item_id,
            })
            .await;

        self.view(user_id).await
    }

    /// Removes a single line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self
            .find_cart(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let result = CartItem::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(
                "Product not found in cart".to_string(),
            ));
        }

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            })
            .await;

        self.view(user_id).await
    }

    /// Empties the cart. The cart row itself is kept; clearing a user with
    /// no cart is a no-op.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let Some(cart) = self.find_cart(user_id).await? else {
            return Ok(());
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;

        info!(cart_id = %cart.id, "Cleared cart");
        Ok(())
    }

    /// Enriched read of the cart: lines joined with product display fields,
    /// per-line subtotals from the snapshot price, and the cart total.
    #[instrument(skip(self))]
    pub async fn view(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let Some(cart) = self.find_cart(user_id).await? else {
            return Ok(CartView::empty(user_id));
        };

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<Uuid, ProductModel> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            crate::entities::Product::find()
                .filter(crate::entities::product::Column::Id.is_in(product_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let items: Vec<CartLineView> = lines
            .into_iter()
            .map(|line| {
                let product = products.get(&line.product_id);
                CartLineView {
                    id: line.id,
                    product_id: line.product_id,
                    name: product.map(|p| p.name.clone()).unwrap_or_default(),
                    size: line.size,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    subtotal: line.unit_price * Decimal::from(line.quantity),
                    stock: product.map(|p| p.stock).unwrap_or(0),
                }
            })
            .collect();

        let total = items.iter().map(|i| i.subtotal).sum();
        let items_count = items.len();

        Ok(CartView {
            cart_id: Some(cart.id),
            user_id,
            items,
            total,
            items_count,
        })
    }
}

fn out_of_stock(product: &ProductModel) -> ServiceError {
    ServiceError::InsufficientStock(format!("Product {} is not in stock", product.name))
}
