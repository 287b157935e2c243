//! Stock ledger: the authoritative per-product available-quantity store.
//!
//! Adjustments are expressed as a single guarded SQL update so that two
//! concurrent decrements serialize through the store's atomic increment
//! operator; the new quantity is never computed in application memory and
//! written back unconditionally.

use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{product, Product, ProductModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    /// Restock / release: `stock += qty`.
    Increment,
    /// Reserve: `stock -= qty`, guarded so stock never goes negative.
    Decrement,
}

#[derive(Clone)]
pub struct StockService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl StockService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Pure availability read: does the product carry at least `quantity`?
    pub fn check_availability(product: &ProductModel, quantity: i32) -> bool {
        product.stock >= quantity
    }

    /// Atomically adjusts a product's stock and returns the post-update
    /// value. Decrements carry a `stock >= qty` precondition; when it does
    /// not hold the call fails with `InsufficientStock` and the row is
    /// untouched. A missing product is `NotFound`. Every successful adjust
    /// emits a stock-change event that fans out to live subscribers.
    #[instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: Uuid,
        quantity: i32,
        direction: StockDirection,
    ) -> Result<i32, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidOperation(
                "Adjustment quantity must be positive".to_string(),
            ));
        }

        let update = match direction {
            StockDirection::Increment => Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(quantity),
                )
                .filter(product::Column::Id.eq(product_id)),
            StockDirection::Decrement => Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(quantity),
                )
                .filter(product::Column::Id.eq(product_id))
                .filter(product::Column::Stock.gte(quantity)),
        };

        let result = update.exec(&*self.db).await?;

        if result.rows_affected == 0 {
            // Distinguish a missing product from a failed precondition.
            let current = Product::find_by_id(product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;
            return Err(ServiceError::InsufficientStock(format!(
                "Product {} has {} in stock, requested {}",
                current.name, current.stock, quantity
            )));
        }

        let new_stock = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .map(|p| p.stock)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        self.event_sender
            .send_or_log(Event::StockAdjusted {
                product_id,
                new_stock,
            })
            .await;

        info!(product_id = %product_id, new_stock, "Adjusted stock");
        Ok(new_stock)
    }

    /// Guarded decrement, used when an order reserves its lines.
    pub async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<i32, ServiceError> {
        self.adjust(product_id, quantity, StockDirection::Decrement)
            .await
    }

    /// Increment, used for restock and refund flows.
    pub async fn release(&self, product_id: Uuid, quantity: i32) -> Result<i32, ServiceError> {
        self.adjust(product_id, quantity, StockDirection::Increment)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn product_with_stock(stock: i32) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            name: "Home Jersey".to_string(),
            description: String::new(),
            price: dec!(100),
            discount_percent: dec!(0),
            stock,
            sizes: serde_json::json!(["M"]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn availability_holds_when_stock_covers_quantity() {
        assert!(StockService::check_availability(&product_with_stock(5), 5));
        assert!(StockService::check_availability(&product_with_stock(5), 1));
    }

    #[test]
    fn availability_fails_when_quantity_exceeds_stock() {
        assert!(!StockService::check_availability(&product_with_stock(2), 3));
        assert!(!StockService::check_availability(&product_with_stock(0), 1));
    }
}
