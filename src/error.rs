use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Handler-boundary error taxonomy. Validation and auth failures carry their
/// message to the caller; storage and other internal failures are logged and
/// surfaced as a generic 500 without leaking detail.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Access denied. No token provided.")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    UserExists,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(Box::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::MissingToken => {
                (StatusCode::UNAUTHORIZED, json!({ "message": self.to_string() }))
            }
            // A malformed token has always been a 400 here, not a 401.
            AppError::InvalidToken => {
                (StatusCode::BAD_REQUEST, json!({ "message": self.to_string() }))
            }
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, json!({ "message": self.to_string() }))
            }
            AppError::UserExists => (StatusCode::CONFLICT, json!({ "message": self.to_string() })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "message": msg })),
            AppError::Store(err) => {
                error!(error = %err, "storage failure at handler boundary");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Server error" }),
                )
            }
            AppError::Internal(err) => {
                error!(error = %err, "internal failure at handler boundary");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
