//! API route handlers

pub mod engine;
pub mod webhook;

use crate::errors::EngineError;
use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Validation and lifecycle failures are the caller's; chain lookups are upstream
pub(crate) fn engine_error(e: EngineError) -> ApiError {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    };
    error(status, e.to_string())
}
