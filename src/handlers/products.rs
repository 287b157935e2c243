use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, paginated_response, success_response, validate_input};
use crate::services::catalog::CreateProductInput;
use crate::AppState;
use crate::ListQuery;

pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
        .route("/{id}/stock/reserve", post(reserve_stock))
        .route("/{id}/stock/release", post(release_stock))
}

async fn create_product(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.create_product(payload).await?;
    Ok(created_response(product, "Product created successfully"))
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (products, total) = state
        .services
        .catalog
        .list_products(query.page, query.limit)
        .await?;
    Ok(paginated_response(products, total, query.page, query.limit))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(success_response(product, "Product fetched successfully"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct StockAdjustRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn reserve_stock(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockAdjustRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let new_stock = state.services.stock.reserve(id, payload.quantity).await?;
    Ok(success_response(
        serde_json::json!({ "productId": id, "stock": new_stock }),
        "Stock reserved successfully",
    ))
}

async fn release_stock(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockAdjustRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let new_stock = state.services.stock.release(id, payload.quantity).await?;
    Ok(success_response(
        serde_json::json!({ "productId": id, "stock": new_stock }),
        "Stock released successfully",
    ))
}
