//! API error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vgb_compiler::CompileError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited => "rate_limited",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<CompileError> for ApiError {
    fn from(err: CompileError) -> Self {
        let msg = err.to_string();
        match err {
            CompileError::EventNotFound(_) | CompileError::NoOutput(_) => Self::NotFound(msg),
            CompileError::AlreadyCompiled(_)
            | CompileError::NoMessages(_)
            | CompileError::InProgress(_) => Self::Conflict(msg),
            CompileError::Storage(_) | CompileError::Metadata(_) => Self::Unavailable(msg),
            CompileError::Timeout(..)
            | CompileError::ConfigError(_)
            | CompileError::Media(_)
            | CompileError::Io(_) => Self::Internal(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Unavailable(_) => {
                if std::env::var("ENVIRONMENT")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("production")
                {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            detail,
            code: Some(self.code().to_string()),
        };

        if matches!(self, ApiError::RateLimited) {
            return (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgb_models::EventId;
    use vgb_storage::StorageError;

    #[test]
    fn test_compile_errors_map_to_status_codes() {
        let id = EventId::new("E1");
        let cases = [
            (CompileError::EventNotFound(id.clone()), StatusCode::NOT_FOUND),
            (CompileError::NoOutput(id.clone()), StatusCode::NOT_FOUND),
            (CompileError::InProgress(id.clone()), StatusCode::CONFLICT),
            (CompileError::AlreadyCompiled(id.clone()), StatusCode::CONFLICT),
            (
                CompileError::Storage(StorageError::not_found("k")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CompileError::config_error("bad"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::conflict("busy").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Conflict: busy");
        assert_eq!(json["code"], "conflict");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
