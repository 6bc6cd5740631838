use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::dispatch::{DispatchError, ErrorKind};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details): (StatusCode, &str, String, Option<Value>) =
            match &self {
                AppError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
                }
                AppError::Dispatch(e) => {
                    let (status, code) = match e.kind() {
                        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                        ErrorKind::Protocol => (StatusCode::BAD_REQUEST, "PROTOCOL_ERROR"),
                        ErrorKind::Transport => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR"),
                        ErrorKind::LogicalServer => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
                        ErrorKind::Rendering => (StatusCode::BAD_GATEWAY, "RENDERING_ERROR"),
                        ErrorKind::Batch => (StatusCode::BAD_GATEWAY, "BATCH_ERROR"),
                    };
                    if !e.is_preflight() {
                        tracing::error!("Dispatch failed: {e}");
                    }
                    let details = match e {
                        DispatchError::Batch(failure) => serde_json::to_value(failure).ok(),
                        other => serde_json::to_value(other.details()).ok(),
                    };
                    (status, code, e.to_string(), details)
                }
            };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
