use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) | AppError::Precondition(msg) => Self::ValidationError(msg),
            AppError::Auth(msg) => Self::Unauthorized(msg),
            AppError::Upstream(msg) => Self::UpstreamUnavailable(msg),
            other => {
                tracing::error!("Internal error: {:?}", other);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            Self::UpstreamUnavailable(message) => (StatusCode::BAD_GATEWAY, message),
        };

        let body = ErrorResponse {
            error: message,
            status: "error".to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn app_errors_map_to_api_errors() {
        let api_error = ApiError::from(AppError::NotFound("Article a1 not found".to_string()));
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "Article a1 not found"));

        let api_error = ApiError::from(AppError::Validation("empty query".to_string()));
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "empty query"));

        let api_error = ApiError::from(AppError::Precondition("no translation".to_string()));
        assert!(matches!(api_error, ApiError::ValidationError(_)));

        let api_error = ApiError::from(AppError::Upstream("miniflux 502".to_string()));
        assert!(matches!(api_error, ApiError::UpstreamUnavailable(_)));

        let api_error = ApiError::from(AppError::Io(std::io::Error::other("disk")));
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn status_codes() {
        assert_status_code(
            ApiError::InternalError("boom".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(
            ApiError::ValidationError("bad".to_string()),
            StatusCode::BAD_REQUEST,
        );
        assert_status_code(ApiError::NotFound("gone".to_string()), StatusCode::NOT_FOUND);
        assert_status_code(
            ApiError::Unauthorized("no key".to_string()),
            StatusCode::UNAUTHORIZED,
        );
        assert_status_code(
            ApiError::UpstreamUnavailable("down".to_string()),
            StatusCode::BAD_GATEWAY,
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let api_error = ApiError::InternalError("db password incorrect".to_string());
        assert_eq!(api_error.to_string(), "Internal server error");
    }
}
