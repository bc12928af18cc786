//! Error types for the modelvault server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::fetch::FetchError;
use crate::store::StoreError;

/// Errors raised by catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Failed to fetch model '{model_id}': {source}")]
    Fetch {
        model_id: String,
        #[source]
        source: FetchError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Registry(err) => match err {
                RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "Model not found".to_string()),
                RegistryError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
                RegistryError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                RegistryError::Fetch { .. } => (StatusCode::BAD_GATEWAY, err.to_string()),
                RegistryError::Storage(e) => {
                    tracing::error!("Storage error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
                RegistryError::Internal(msg) => {
                    tracing::error!("Internal error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let body = serde_json::json!({
            "success": false,
            "error": message,
        });
        (status, Json(body)).into_response()
    }
}
