use axum::response::Json;
use utils::response::ApiResponse;

use crate::error::ApiError;

pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("no such endpoint".to_string())
}
