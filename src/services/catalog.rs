//! Product catalog surface.
//!
//! The catalog is owned by an external collaborator; this service exposes
//! the contract the cart and checkout paths depend on (`price`,
//! `discount -> final_price`, `stock`, `sizes` by product id) plus the
//! small admin surface needed to seed it.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{product, Product, ProductModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    pub stock: i32,
    #[serde(default)]
    pub sizes: Vec<String>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let existing = Product::find()
            .filter(product::Column::Name.eq(input.name.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "Product with this name already exists".to_string(),
            ));
        }

        if input.stock < 0 {
            return Err(ServiceError::ValidationError(
                "Stock cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            discount_percent: Set(input.discount_percent),
            stock: Set(input.stock),
            sizes: Set(serde_json::json!(input.sizes)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        info!(product_id = %created.id, "Created product");
        Ok(created)
    }

    /// Resolves a product by id; absence is fatal to the calling operation.
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let paginator = Product::find()
            .order_by_asc(product::Column::Name)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }
}
