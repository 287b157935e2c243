use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::errors::ServiceError;
use crate::{ApiResponse, ListResponse, Pagination};

/// `200 OK` with the standard `{data, message}` envelope.
pub fn success_response<T: Serialize>(data: T, message: &str) -> Response {
    (StatusCode::OK, Json(ApiResponse::new(data, message))).into_response()
}

/// `201 Created` with the standard envelope.
pub fn created_response<T: Serialize>(data: T, message: &str) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::new(data, message))).into_response()
}

/// `200 OK` with the list envelope and pagination block.
pub fn paginated_response<T: Serialize>(
    data: Vec<T>,
    total: u64,
    page: u64,
    page_size: u64,
) -> Response {
    let body = ListResponse {
        data,
        pagination: Pagination::new(total, page, page_size),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Runs declarative request validation, mapping failures onto the error
/// taxonomy.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))
}
