pub mod carts;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payment_webhooks;
pub mod products;
pub mod stock_feed;
