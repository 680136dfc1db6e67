// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("User must be authenticated")]
    Unauthenticated,

    #[error("{0}")]
    Internal(String),

    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Duplicate payment for checkout request {0}")]
    DuplicateKey(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AppError {
    /// Wire-level error kind shared with callers.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) => "invalid-argument",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Internal(_)
            | AppError::MongoDB(_)
            | AppError::DuplicateKey(_)
            | AppError::ConfigurationError(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Driver errors can carry hostnames and credentials.
            AppError::MongoDB(_) => "Database error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": self.kind(),
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (self.status(), body).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| match &err.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        AppError::InvalidArgument(messages.join(", "))
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::InvalidArgument(format!("Invalid request body: {}", rejection.body_text()))
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        AppError::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_caller_taxonomy() {
        assert_eq!(AppError::invalid_argument("x").kind(), "invalid-argument");
        assert_eq!(AppError::Unauthenticated.kind(), "unauthenticated");
        assert_eq!(AppError::internal("boom").kind(), "internal");
        assert_eq!(AppError::DuplicateKey("ws_CO_1".into()).kind(), "internal");
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::invalid_argument("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::internal("boom").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
