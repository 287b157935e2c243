//! Storefront API Library
//!
//! Order-fulfillment backend: carts, coupons, stock ledger, checkout
//! orchestration, payment settlement, and live stock notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::auth::TokenVerifier;
use crate::services::payments::WebhookVerifier;
use crate::services::stock_feed::StockFeed;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
    pub stock_feed: Arc<StockFeed>,
    pub token_verifier: Arc<TokenVerifier>,
    pub webhook_verifier: Arc<WebhookVerifier>,
}

/// Common query parameters for list endpoints.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, message: &str) -> Self {
        Self {
            data,
            message: message.to_string(),
        }
    }
}

/// List envelope with the pagination block.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_size: u64,
    pub total_pages: u64,
    pub page_number: u64,
    pub page_size: u64,
}

impl Pagination {
    pub fn new(total_size: u64, page_number: u64, page_size: u64) -> Self {
        let page_size = page_size.max(1);
        Self {
            total_size,
            total_pages: total_size.div_ceil(page_size),
            page_number,
            page_size,
        }
    }
}

/// The full v1 API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/products", handlers::products::products_routes())
        .nest("/cart", handlers::carts::carts_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/coupons", handlers::coupons::coupons_routes())
        .nest("/payments", handlers::payment_webhooks::webhook_routes())
        .nest("/ws", handlers::stock_feed::stock_feed_routes())
}
