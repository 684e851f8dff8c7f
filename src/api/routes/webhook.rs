//! Inbound trade webhook
//!
//! Accepts batches of enhanced transactions pushed by the indexer and feeds
//! the ones touching the configured asset into the engine's trade window.

use super::{error, ApiError};
use crate::api::server::AppState;
use crate::engine::IngestSummary;
use crate::sources::EnhancedTransaction;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tracing::{debug, warn};

/// Compare without short-circuiting on the first differing byte
fn secrets_match(supplied: &str, expected: &str) -> bool {
    let (a, b) = (supplied.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Secret from `Authorization: Bearer <secret>` or a bare `Authorization: <secret>`
fn supplied_secret(bearer: Option<&Authorization<Bearer>>, headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = bearer {
        return Some(auth.token().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    headers: HeaderMap,
    payload: Result<Json<Vec<EnhancedTransaction>>, JsonRejection>,
) -> Result<Json<IngestSummary>, ApiError> {
    let Some(expected) = state.config.webhook_secret.as_deref() else {
        return Err(error(StatusCode::SERVICE_UNAVAILABLE, "Webhook is not configured"));
    };

    let supplied = supplied_secret(bearer.as_ref().map(|TypedHeader(auth)| auth), &headers);
    if !supplied.map(|s| secrets_match(&s, expected)).unwrap_or(false) {
        warn!("[Webhook] Rejected request with missing or invalid secret");
        return Err(error(StatusCode::UNAUTHORIZED, "Invalid webhook secret"));
    }

    let Json(transactions) =
        payload.map_err(|e| error(StatusCode::BAD_REQUEST, format!("Invalid webhook body: {}", e.body_text())))?;

    debug!("[Webhook] Received {} transactions", transactions.len());
    Ok(Json(state.engine.ingest_pushed(&transactions).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cres", "s3cret"));
        assert!(!secrets_match("s3cre", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }

    #[test]
    fn test_raw_header_secret() {
        let mut headers = HeaderMap::new();
        assert_eq!(supplied_secret(None, &headers), None);
        headers.insert(header::AUTHORIZATION, "  s3cret ".parse().unwrap());
        assert_eq!(supplied_secret(None, &headers).as_deref(), Some("s3cret"));
    }
}
