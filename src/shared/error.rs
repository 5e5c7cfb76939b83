//! Application Error Types
//!
//! Centralized error taxonomy shared by the use-case layer, the repositories
//! and the realtime gateway, with Axum integration for REST-style callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Pin limit reached: a channel can hold at most {limit} pinned messages")]
    PinLimitExceeded { limit: usize },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Coarse error category exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Validation,
    Transient,
}

impl AppError {
    /// Category of this error in the public taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Validation(_) | AppError::PinLimitExceeded { .. } | AppError::Conflict(_) => {
                ErrorKind::Validation
            }
            AppError::Storage(_) | AppError::Internal(_) | AppError::Database(_) => {
                ErrorKind::Transient
            }
        }
    }

    /// Stable numeric code, shared by HTTP bodies and realtime error frames.
    pub fn code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 10001,
            AppError::Unauthorized(_) => 10003,
            AppError::Conflict(_) => 10005,
            AppError::Validation(_) => 10007,
            AppError::PinLimitExceeded { .. } => 10008,
            AppError::Storage(_) | AppError::Internal(_) | AppError::Database(_) => 10000,
        }
    }

    /// Message safe to show to a client. Infrastructure details are hidden.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Transient => "Internal server error".into(),
            _ => self.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Field-level validation error
#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::Validation => match self {
                AppError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            },
            ErrorKind::Transient => {
                tracing::error!(error = %self, "Internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            code: self.code(),
            kind: self.kind(),
            message: self.public_message(),
            errors: None,
        };

        (status, Json(body)).into_response()
    }
}
