//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cdp_ingest::error::{AdminError, IngestError};
use cdp_ingest::store::StoreError;
use thiserror::Error;

use crate::api::response::ErrorResponse;

/// Result type alias for handlers
pub type ApiResult<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Ingest(IngestError::Store(err))
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Admin(err) => {
                let status = match err {
                    AdminError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    AdminError::PermissionDenied => StatusCode::FORBIDDEN,
                    AdminError::NotFound(_) => StatusCode::NOT_FOUND,
                    AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), err.to_string())
            },
            AppError::Ingest(IngestError::Store(StoreError::NotFound(what))) => {
                (StatusCode::NOT_FOUND, "not-found", format!("not found: {what}"))
            },
            AppError::Ingest(err @ IngestError::Read { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid-argument", err.to_string())
            },
            AppError::Ingest(err) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string()),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, "not-found", message.clone()),
            AppError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "invalid-argument", message.clone())
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let message = if status.is_server_error() {
            tracing::error!(code, error = %message, "Request failed");
            "An internal error occurred".to_string()
        } else {
            message
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
