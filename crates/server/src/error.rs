use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{run_tracker::TrackingError, storage::StorageError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error, ts_rs::TS)]
#[ts(type = "string")]
pub enum ApiError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Tracking(err) => match err {
                TrackingError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
                TrackingError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFoundError"),
                TrackingError::AlreadyCompleted(_) => (StatusCode::CONFLICT, "AlreadyCompleted"),
                TrackingError::Storage(StorageError::Timeout(_)) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "TimeoutError")
                }
                TrackingError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageError"),
            },
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
        };

        let error_message = match &self {
            ApiError::Tracking(
                TrackingError::Validation(msg) | TrackingError::NotFound(msg),
            ) => msg.clone(),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
            // storage details stay in the log
            _ if status_code.is_server_error() => {
                format!("{error_type}: request could not be completed")
            }
            _ => self.to_string(),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

// Malformed bodies, queries and path segments share the validation envelope.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use db::DbErr;

    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn tracking_errors_map_to_http_statuses() {
        assert_eq!(
            status_of(TrackingError::Validation("job_name must not be empty".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(TrackingError::NotFound("ETL run 7".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(TrackingError::AlreadyCompleted(7)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(TrackingError::Storage(StorageError::Timeout(Duration::from_secs(15)))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(TrackingError::from(DbErr::Custom("disk I/O error".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn plain_errors_map_to_http_statuses() {
        assert_eq!(
            status_of(ApiError::BadRequest("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::NotFound("missing".to_string())),
            StatusCode::NOT_FOUND
        );
    }
}
