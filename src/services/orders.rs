//! Checkout orchestrator and order state machine.
//!
//! Cart-to-order conversion, checkout-time re-validation and pricing, the
//! cash/card branch, and the idempotent webhook settlement path.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    order, order_item, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus, PaymentMethod,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::CartService;
use crate::services::catalog::CatalogService;
use crate::services::coupons::CouponService;
use crate::services::payments::{
    CheckoutSessionRequest, PaymentProvider, SessionLineItem, WebhookEvent,
    CHECKOUT_SESSION_COMPLETED,
};
use crate::services::stock::StockService;

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    catalog: CatalogService,
    stock: StockService,
    carts: CartService,
    coupons: CouponService,
    provider: Arc<dyn PaymentProvider>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub customer_name: String,
    pub phone: String,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderInput {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: Option<String>,
}

/// What checkout produced: a settled cash order, or a pending card order
/// plus the hosted-payment redirect.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CheckoutOutcome {
    Cash {
        order: OrderModel,
    },
    #[serde(rename_all = "camelCase")]
    Card {
        order: OrderModel,
        redirect_url: String,
    },
}

/// Result of feeding one provider event through settlement.
#[derive(Debug)]
pub enum SettlementDisposition {
    /// Event type or correlation id the system does not care about.
    Ignored,
    /// The conditional settlement write matched no unpaid card order:
    /// duplicate delivery or unknown order. Deliberate no-op.
    NoOp,
    Settled(Box<OrderModel>),
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

struct LineSnapshot {
    product_id: Uuid,
    name: String,
    size: String,
    unit_price: Decimal,
    quantity: i32,
    subtotal: Decimal,
    discount_percent: Decimal,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        catalog: CatalogService,
        stock: StockService,
        carts: CartService,
        coupons: CouponService,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            stock,
            carts,
            coupons,
            provider,
        }
    }

    /// Converts the caller's cart into an order.
    ///
    /// Every line is re-resolved against the live catalog and re-validated
    /// for stock at checkout time; any failure aborts the whole attempt
    /// before anything is persisted. Pricing uses the product's current
    /// effective price, not the cart snapshot.
    #[instrument(skip(self, input), fields(user_id = %user_id, payment_method = ?input.payment_method))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let cart = self.carts.view(user_id).await?;
        let Some(cart_id) = cart.cart_id.filter(|_| !cart.items.is_empty()) else {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        };

        let mut total_price = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            let product = self.catalog.get_product(line.product_id).await?;
            if !StockService::check_availability(&product, line.quantity) {
                return Err(ServiceError::InsufficientStock(format!(
                    "Product {} is not in stock",
                    product.name
                )));
            }
            let unit_price = product.final_price();
            let subtotal = unit_price * Decimal::from(line.quantity);
            total_price += subtotal;
            snapshots.push(LineSnapshot {
                product_id: product.id,
                name: product.name,
                size: line.size.clone(),
                unit_price,
                quantity: line.quantity,
                subtotal,
                discount_percent: product.discount_percent,
            });
        }

        let quote = match &input.coupon_code {
            Some(code) => Some(self.coupons.apply(code, total_price).await?),
            None => None,
        };
        let discount = quote.as_ref().map(|q| q.discount).unwrap_or(Decimal::ZERO);
        let final_total = quote
            .as_ref()
            .map(|q| q.final_total)
            .unwrap_or(total_price);

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            cart_id: Set(cart_id),
            customer_name: Set(input.customer_name),
            phone: Set(input.phone),
            shipping_address: Set(input.shipping_address),
            total_price: Set(final_total),
            discount: Set(discount),
            coupon_code: Set(quote.as_ref().map(|q| q.code.clone())),
            payment_method: Set(input.payment_method),
            order_status: Set(OrderStatus::Pending),
            paid: Set(false),
            payment_intent: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order_model.insert(&txn).await?;

        for snap in &snapshots {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(snap.product_id),
                name: Set(snap.name.clone()),
                size: Set(snap.size.clone()),
                unit_price: Set(snap.unit_price),
                quantity: Set(snap.quantity),
                subtotal: Set(snap.subtotal),
                discount_percent: Set(snap.discount_percent),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        match input.payment_method {
            PaymentMethod::Cash => {
                // Reservation happens now; the order settles synchronously.
                for snap in &snapshots {
                    self.stock.reserve(snap.product_id, snap.quantity).await?;
                }
                self.carts.clear(user_id).await?;

                let mut active: order::ActiveModel = order.into();
                active.order_status = Set(OrderStatus::Completed);
                active.updated_at = Set(Utc::now());
                let order = active.update(&*self.db).await?;

                if let Some(quote) = &quote {
                    self.coupons.record_redemption(&quote.code).await?;
                }

                self.event_sender
                    .send_or_log(Event::OrderCompleted(order_id))
                    .await;
                info!(order_id = %order_id, "Cash order completed");
                Ok(CheckoutOutcome::Cash { order })
            }
            PaymentMethod::Card => {
                // Stock is not reserved here; it is decremented only when
                // the provider confirms settlement.
                let discount_coupon = match &quote {
                    Some(quote) => Some(self.provider.create_discount(quote.value).await?),
                    None => None,
                };

                let session = self
                    .provider
                    .create_checkout_session(CheckoutSessionRequest {
                        order_id,
                        customer_email: input.customer_email,
                        line_items: snapshots
                            .iter()
                            .map(|snap| SessionLineItem {
                                name: snap.name.clone(),
                                unit_price: snap.unit_price,
                                quantity: snap.quantity,
                            })
                            .collect(),
                        discount_coupon,
                    })
                    .await?;

                self.event_sender
                    .send_or_log(Event::CheckoutSessionCreated {
                        order_id,
                        session_id: session.id,
                    })
                    .await;
                info!(order_id = %order_id, "Card order pending settlement");
                Ok(CheckoutOutcome::Card {
                    order,
                    redirect_url: session.url,
                })
            }
        }
    }

    /// Applies one verified provider event. Unrecognized event types and
    /// events without an order correlation id are acknowledged no-ops so
    /// the provider is never induced into retry loops.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn apply_webhook_event(
        &self,
        event: WebhookEvent,
    ) -> Result<SettlementDisposition, ServiceError> {
        if event.event_type != CHECKOUT_SESSION_COMPLETED {
            info!("Ignoring webhook event type {}", event.event_type);
            return Ok(SettlementDisposition::Ignored);
        }
        let Some(order_id) = event.order_id() else {
            info!("Settlement event without order correlation id; ignoring");
            return Ok(SettlementDisposition::Ignored);
        };
        let payment_intent = match event.data.object.payment_intent {
            Some(pi) => pi,
            None => event.data.object.id,
        };

        self.settle_card_order(order_id, payment_intent).await
    }

    /// Settles a card order exactly once.
    ///
    /// The settlement is a single conditional write: it matches only a
    /// pending, unpaid card order, so a redelivered event (or a concurrent
    /// admin transition that won the race) matches zero rows and performs
    /// no further action. Stock decrement, cart clearing, and coupon
    /// redemption run only when the write changed a row.
    #[instrument(skip(self))]
    pub async fn settle_card_order(
        &self,
        order_id: Uuid,
        payment_intent: String,
    ) -> Result<SettlementDisposition, ServiceError> {
        let result = Order::update_many()
            .set(order::ActiveModel {
                paid: Set(true),
                order_status: Set(OrderStatus::Completed),
                payment_intent: Set(Some(payment_intent.clone())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Paid.eq(false))
            .filter(order::Column::PaymentMethod.eq(PaymentMethod::Card))
            .filter(order::Column::OrderStatus.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            info!(order_id = %order_id, "Settlement matched no unpaid card order; no-op");
            return Ok(SettlementDisposition::NoOp);
        }

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        // Payment is already captured at this point, so a line that cannot
        // be decremented (the documented oversell window) is logged and the
        // rest of settlement proceeds.
        for item in &items {
            if let Err(e) = self.stock.reserve(item.product_id, item.quantity).await {
                error!(order_id = %order_id, product_id = %item.product_id, error = %e,
                    "Stock decrement failed during settlement");
            }
        }

        self.carts.clear(order.user_id).await?;

        if let Some(code) = &order.coupon_code {
            self.coupons.record_redemption(code).await?;
        }

        self.event_sender
            .send_or_log(Event::OrderSettled {
                order_id,
                payment_intent,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCompleted(order_id))
            .await;

        info!(order_id = %order_id, "Card order settled");
        Ok(SettlementDisposition::Settled(Box::new(order)))
    }

    /// Administrative status transition. Only pending orders may move;
    /// `completed` and `cancelled` are terminal. The write is conditioned
    /// on the pending state so a race against webhook settlement resolves
    /// to exactly one winner.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        if status == OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "Orders cannot return to pending".to_string(),
            ));
        }

        let result = Order::update_many()
            .set(order::ActiveModel {
                order_status: Set(status),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::OrderStatus.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let existing = Order::find_by_id(order_id).one(&*self.db).await?;
            return match existing {
                None => Err(ServiceError::NotFound(format!(
                    "Order {} not found",
                    order_id
                ))),
                Some(_) => Err(ServiceError::Conflict(
                    "Order is already finalized".to_string(),
                )),
            };
        }

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let event = match status {
            OrderStatus::Cancelled => Event::OrderCancelled(order_id),
            _ => Event::OrderCompleted(order_id),
        };
        self.event_sender.send_or_log(event).await;

        Ok(order)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    /// Lists orders, newest first, optionally scoped to one user.
    pub async fn list(
        &self,
        user_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    pub async fn update(
        &self,
        order_id: Uuid,
        input: UpdateOrderInput,
    ) -> Result<OrderModel, ServiceError> {
        let existing = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = existing.into();
        if let Some(name) = input.customer_name {
            active.customer_name = Set(name);
        }
        if let Some(phone) = input.phone {
            active.phone = Set(phone);
        }
        if let Some(address) = input.shipping_address {
            active.shipping_address = Set(address);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    pub async fn remove(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let result = Order::delete_by_id(order_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order_id
            )));
        }
        warn!(order_id = %order_id, "Order deleted");
        Ok(())
    }
}
