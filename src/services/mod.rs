pub mod carts;
pub mod catalog;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod stock;
pub mod stock_feed;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;

/// The service graph shared by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: catalog::CatalogService,
    pub stock: stock::StockService,
    pub carts: carts::CartService,
    pub coupons: coupons::CouponService,
    pub orders: orders::OrderService,
}

impl AppServices {
    /// Wires every service against the shared connection pool and event
    /// bus, with the given payment provider at the card-checkout seam.
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        provider: Arc<dyn payments::PaymentProvider>,
    ) -> Self {
        let catalog = catalog::CatalogService::new(db.clone(), event_sender.clone());
        let stock = stock::StockService::new(db.clone(), event_sender.clone());
        let carts = carts::CartService::new(db.clone(), event_sender.clone(), catalog.clone());
        let coupons = coupons::CouponService::new(db.clone(), event_sender.clone());
        let orders = orders::OrderService::new(
            db,
            event_sender,
            catalog.clone(),
            stock.clone(),
            carts.clone(),
            coupons.clone(),
            provider,
        );

        Self {
            catalog,
            stock,
            carts,
            coupons,
            orders,
        }
    }
}
