use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::Json;
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::external::FetchError;
use crate::models::TickerError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("External error: {0}")]
    External(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let message = self.to_string();
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response(),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response(),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response(),
            AppError::RateLimited => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from_static("60"));
                (StatusCode::TOO_MANY_REQUESTS, headers, Json(json!({ "error": message }))).into_response()
            },
            AppError::External(_) => (StatusCode::BAD_GATEWAY, Json(json!({ "error": message }))).into_response(),
            AppError::Config(_) => {
                tracing::error!("{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Internal server error" }))).into_response()
            },
        }
    }
}

impl From<FetchError> for AppError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::AuthRequired => AppError::Unauthorized,
            FetchError::RateLimited => AppError::RateLimited,
            FetchError::NotConfigured(what) => AppError::Config(what),
            FetchError::Network(msg) | FetchError::Malformed(msg) => AppError::External(msg),
        }
    }
}

impl From<TickerError> for AppError {
    fn from(value: TickerError) -> Self {
        AppError::Validation(value.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value.to_string())
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}
