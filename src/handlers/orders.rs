use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, paginated_response, success_response};
use crate::services::orders::{CreateOrderInput, UpdateOrderInput};
use crate::AppState;
use crate::ListQuery;

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
        .route("/{id}", put(update_order))
        .route("/{id}", delete(delete_order))
        .route("/{id}/status", put(change_order_status))
}

async fn create_order(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.orders.create_order(user_id, payload).await?;
    Ok(created_response(outcome, "Order created successfully"))
}

async fn list_orders(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list(Some(user_id), query.page, query.limit)
        .await?;
    Ok(paginated_response(orders, total, query.page, query.limit))
}

async fn get_order(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get(id).await?;
    Ok(success_response(order, "Order fetched successfully"))
}

async fn update_order(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.update(id, payload).await?;
    Ok(success_response(order, "Order updated successfully"))
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
}

async fn change_order_status(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.change_status(id, payload.status).await?;
    Ok(success_response(order, "Order status updated successfully"))
}

async fn delete_order(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.orders.remove(id).await?;
    Ok(success_response(
        serde_json::json!({}),
        "Order deleted successfully",
    ))
}
