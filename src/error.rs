use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Configuration rejected before any request is dispatched. Each variant
/// names the violated constraint so the caller sees exactly what to fix.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base_url must be an absolute http(s) URL: {0}")]
    InvalidBaseUrl(String),

    #[error("concurrent_calls must be between 1 and 1000, got {0}")]
    ConcurrentCallsOutOfRange(u32),

    #[error("sequential_batches must be at most 100, got {0}")]
    SequentialBatchesOutOfRange(u32),

    #[error("timeout must be between 1 and 300 seconds, got {0}")]
    TimeoutOutOfRange(u64),

    #[error("invalid HTTP header name: '{0}'")]
    InvalidHeaderName(String),

    #[error("invalid HTTP header value for '{0}'")]
    InvalidHeaderValue(String),
}

/// Engine-level fault that prevents the scheduler from proceeding. Individual
/// request failures are data, not errors; this type is reserved for the cases
/// that terminate a session as `failed`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to construct HTTP client: {0}")]
    ClientBuild(String),

    #[error("configuration rejected after acceptance: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("configuration name already exists")]
    DuplicateName,

    #[error("configuration not found")]
    ConfigNotFound,

    #[error("configuration document must be a JSON object")]
    InvalidDocument,
}

/// HTTP boundary errors. Rendered as `{"detail": "..."}` bodies, matching
/// the wire shape clients of the service already expect.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("test session not found: {0}")]
    SessionNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::DuplicateName) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::InvalidDocument) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::ConfigNotFound) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}
