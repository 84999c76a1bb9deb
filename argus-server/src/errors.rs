use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

use argus_core::EngineError;

/// Envelope error codes surfaced to API clients.
pub mod codes {
    pub const OK: i32 = 0;
    pub const INVALID_IMAGE: i32 = 40007;
    pub const INVALID_INPUT: i32 = 40001;
    pub const NOT_FOUND: i32 = 40401;
    pub const INTERNAL: i32 = 50001;
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: i32,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, message)
    }

    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::INVALID_IMAGE, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "code": self.code,
            "message": self.message,
            "data": null,
        }));
        (self.status, body).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(msg) => Self::not_found(msg),
            EngineError::InvalidInput(msg) => Self::invalid_input(msg),
            EngineError::InvalidFrame(msg) => Self::invalid_image(msg),
            EngineError::Image(e) => Self::invalid_image(e.to_string()),
            EngineError::Config(e) => e.into(),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<argus_config::ConfigError> for AppError {
    fn from(err: argus_config::ConfigError) -> Self {
        match err {
            argus_config::ConfigError::UnknownProfile(p) => {
                Self::invalid_input(format!("unknown profile: {p}"))
            }
            argus_config::ConfigError::UnknownThreshold(k) => {
                Self::invalid_input(format!("unknown threshold key: {k}"))
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_envelope_codes() {
        let err: AppError = EngineError::NotFound("task x".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, codes::NOT_FOUND);

        let err: AppError = EngineError::InvalidFrame("bad".to_string()).into();
        assert_eq!(err.code, codes::INVALID_IMAGE);

        let err: AppError = EngineError::Internal("boom".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, codes::INTERNAL);
    }
}
