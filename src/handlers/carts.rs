use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::common::{success_response, validate_input};
use crate::services::carts::AddItemInput;
use crate::AppState;

pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/", delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/{item_id}", put(update_item))
        .route("/items/{item_id}", delete(remove_item))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub size: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn get_cart(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.carts.view(user_id).await?;
    Ok(success_response(view, "Cart fetched successfully"))
}

async fn add_item(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let view = state
        .services
        .carts
        .add_item(
            user_id,
            AddItemInput {
                product_id: payload.product_id,
                size: payload.size,
                quantity: payload.quantity,
            },
        )
        .await?;

    Ok(success_response(view, "Product added to cart successfully"))
}

async fn update_item(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let view = state
        .services
        .carts
        .update_item(user_id, item_id, payload.quantity)
        .await?;

    Ok(success_response(view, "Cart updated successfully"))
}

async fn remove_item(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.carts.remove_item(user_id, item_id).await?;
    Ok(success_response(
        view,
        "Product removed from cart successfully",
    ))
}

async fn clear_cart(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.clear(user_id).await?;
    Ok(success_response(
        serde_json::json!({}),
        "Cart cleared successfully",
    ))
}
