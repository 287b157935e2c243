use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response};
use crate::services::coupons::{CreateCouponInput, UpdateCouponInput};
use crate::AppState;

pub fn coupons_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon))
        .route("/", get(list_coupons))
        .route("/apply", post(apply_coupon))
        .route("/{code}", get(get_coupon))
        .route("/id/{id}", put(update_coupon))
        .route("/id/{id}", delete(delete_coupon))
}

async fn create_coupon(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Json(payload): Json<CreateCouponInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.create(payload).await?;
    Ok(created_response(coupon, "Coupon created successfully"))
}

async fn list_coupons(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let coupons = state.services.coupons.list().await?;
    Ok(success_response(coupons, "Coupons fetched successfully"))
}

async fn get_coupon(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state
        .services
        .coupons
        .find_by_code(&code)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;
    Ok(success_response(coupon, "Coupon fetched successfully"))
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
    pub total: Decimal,
}

async fn apply_coupon(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let quote = state
        .services
        .coupons
        .apply(&payload.code, payload.total)
        .await?;
    Ok(success_response(quote, "Coupon applied successfully"))
}

async fn update_coupon(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.update(id, payload).await?;
    Ok(success_response(coupon, "Coupon updated successfully"))
}

async fn delete_coupon(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.coupons.remove(id).await?;
    Ok(success_response(
        serde_json::json!({}),
        "Coupon deleted successfully",
    ))
}
