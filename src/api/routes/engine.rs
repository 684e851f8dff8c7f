//! Engine lifecycle endpoints

use super::{engine_error, error, ApiError};
use crate::api::server::AppState;
use crate::engine::{EngineConfigRequest, EngineStatus, StartSummary, StopSummary};
use crate::errors::EngineError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

// ==================== POST /start ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub config: EngineConfigRequest,
    /// Base58 strings or 64-byte arrays
    #[serde(default)]
    pub account_credentials: Vec<Value>,
}

/// Byte-array credentials are passed on in their bracketed text form
fn credential_strings(values: Vec<Value>) -> Result<Vec<String>, ApiError> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::String(s) => Ok(s),
            Value::Array(_) => Ok(value.to_string()),
            _ => Err(error(
                StatusCode::BAD_REQUEST,
                format!("accountCredentials[{}] must be a string or a byte array", index),
            )),
        })
        .collect()
}

pub async fn start_engine(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartSummary>, ApiError> {
    let Json(request) =
        payload.map_err(|e| error(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e.body_text())))?;

    let config = request
        .config
        .into_config(state.config.balance_refresh_seconds)
        .map_err(|e| engine_error(EngineError::Config(e)))?;
    let credentials = credential_strings(request.account_credentials)?;

    info!("[API] Start requested for {} with {} credentials", config.asset, credentials.len());
    let summary = state.engine.start(config, credentials).await.map_err(engine_error)?;
    Ok(Json(summary))
}

// ==================== POST /stop ====================

pub async fn stop_engine(State(state): State<AppState>) -> Result<Json<StopSummary>, ApiError> {
    let summary = state.engine.stop().await.map_err(engine_error)?;
    Ok(Json(summary))
}

// ==================== GET /status ====================

pub async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status().await)
}
