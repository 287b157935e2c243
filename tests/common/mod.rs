//! Shared harness: application services backed by an in-memory SQLite
//! database, with a recording payment provider at the card-checkout seam.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::entities::{coupon, product, DiscountType};
use storefront_api::errors::ServiceError;
use storefront_api::events::{process_events, EventSender};
use storefront_api::migrator::Migrator;
use storefront_api::services::payments::{
    CheckoutSession, CheckoutSessionRequest, PaymentProvider,
};
use storefront_api::services::stock_feed::StockFeed;
use storefront_api::services::AppServices;

/// Payment provider double that records outbound calls instead of speaking
/// to the network.
#[derive(Default)]
pub struct RecordingProvider {
    pub sessions: Mutex<Vec<CheckoutSessionRequest>>,
    pub discounts: Mutex<Vec<Decimal>>,
}

#[async_trait]
impl PaymentProvider for RecordingProvider {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let session = CheckoutSession {
            id: format!("cs_test_{}", request.order_id.simple()),
            url: format!("https://pay.test/c/{}", request.order_id),
        };
        self.sessions.lock().unwrap().push(request);
        Ok(session)
    }

    async fn create_discount(&self, percent_off: Decimal) -> Result<String, ServiceError> {
        self.discounts.lock().unwrap().push(percent_off);
        Ok("disc_test".to_string())
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub stock_feed: Arc<StockFeed>,
    pub provider: Arc<RecordingProvider>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.expect("sqlite connects");
        Migrator::up(&db, None).await.expect("migrations apply");
        let db = Arc::new(db);

        let stock_feed = Arc::new(StockFeed::new());
        let (tx, rx) = mpsc::channel(256);
        let event_sender = EventSender::new(tx);
        let event_task = tokio::spawn(process_events(rx, stock_feed.clone()));

        let provider = Arc::new(RecordingProvider::default());
        let provider_dyn: Arc<dyn PaymentProvider> = provider.clone();
        let services = AppServices::build(db.clone(), event_sender, provider_dyn);

        Self {
            db,
            services,
            stock_feed,
            provider,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> Uuid {
        self.seed_discounted_product(name, price, Decimal::ZERO, stock)
            .await
    }

    pub async fn seed_discounted_product(
        &self,
        name: &str,
        price: Decimal,
        discount_percent: Decimal,
        stock: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            description: Set(format!("{name} description")),
            price: Set(price),
            discount_percent: Set(discount_percent),
            stock: Set(stock),
            sizes: Set(serde_json::json!(["S", "M", "L"])),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("product inserts");
        id
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: Decimal,
        max_usage: i32,
    ) -> Uuid {
        self.seed_coupon_expiring(code, discount_type, value, max_usage, Utc::now() + Duration::days(30))
            .await
    }

    pub async fn seed_coupon_expiring(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: Decimal,
        max_usage: i32,
        expiry_date: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            value: Set(value),
            is_active: Set(true),
            expiry_date: Set(expiry_date),
            usage_count: Set(0),
            max_usage: Set(max_usage),
            description: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("coupon inserts");
        id
    }
}
