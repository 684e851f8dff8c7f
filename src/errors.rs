//! Error types for market data, swaps, broadcasting and the engine lifecycle
//!
//! Upstream HTTP failures are classified from status code and body so the
//! callers can tell transient outages from permanent rejections.

use serde::Deserialize;
use thiserror::Error;

/// Common error body shapes returned by the upstream APIs
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Extract a readable message from an upstream error body
fn upstream_message(body: &str) -> String {
    match serde_json::from_str::<UpstreamErrorBody>(body) {
        Ok(parsed) => parsed
            .error
            .or(parsed.message)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

/// Failure of one market-data provider
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{provider} timed out after {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },

    #[error("{provider} rate limited the request")]
    RateLimited { provider: &'static str },

    #[error("{provider} rejected the API key")]
    Unauthorized { provider: &'static str },

    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Network {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} response malformed: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} has no price for the asset")]
    MissingPrice { provider: &'static str },
}

impl SourceError {
    pub fn from_response(provider: &'static str, status: u16, body: &str) -> Self {
        match status {
            429 => SourceError::RateLimited { provider },
            401 | 403 => SourceError::Unauthorized { provider },
            _ => SourceError::Http {
                provider,
                status,
                message: upstream_message(body),
            },
        }
    }

    pub fn from_network_error(provider: &'static str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else if err.is_decode() {
            return SourceError::Malformed {
                provider,
                message: err.to_string(),
            };
        } else {
            err.to_string()
        };
        SourceError::Network { provider, message }
    }

    /// Whether the provider might answer on the next cycle
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Timeout { .. }
            | SourceError::RateLimited { .. }
            | SourceError::Network { .. } => true,
            SourceError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Every configured market-data source failed or reported no activity
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no market data sources configured")]
    NoSources,

    #[error("all market data sources failed: {}", .failures.join("; "))]
    AllSourcesFailed { failures: Vec<String> },
}

/// Solana JSON-RPC failure
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("RPC request failed: {0}")]
    Network(String),

    #[error("RPC response malformed: {0}")]
    Malformed(String),

    #[error("RPC call timed out")]
    Timeout,
}

impl ChainError {
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Timeout
        } else if err.is_decode() {
            ChainError::Malformed(err.to_string())
        } else {
            ChainError::Network(err.to_string())
        }
    }
}

/// Quote, build or signing failure for one account
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("no route for the swap: {0}")]
    NoRoute(String),

    #[error("swap amount rounds to zero base units")]
    ZeroAmount,

    #[error("swap venue rate limited the request")]
    RateLimited,

    #[error("swap venue returned HTTP {status}: {message}")]
    Venue { status: u16, message: String },

    #[error("swap venue request failed: {0}")]
    Network(String),

    #[error("swap venue response malformed: {0}")]
    Malformed(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl SwapError {
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = upstream_message(body);
        let lower = message.to_lowercase();

        if status == 429 {
            return SwapError::RateLimited;
        }
        if lower.contains("route") || lower.contains("no liquidity") || lower.contains("not tradable") {
            return SwapError::NoRoute(message);
        }
        SwapError::Venue { status, message }
    }

    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            SwapError::Malformed(err.to_string())
        } else {
            SwapError::Network(err.to_string())
        }
    }
}

/// Submission failure on a broadcast channel
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("{channel} timed out after {seconds}s")]
    Timeout { channel: &'static str, seconds: u64 },

    #[error("{channel} rejected the transaction: {message}")]
    Rejected {
        channel: &'static str,
        message: String,
    },

    #[error("{channel} landed {signature} but it failed on chain: {message}")]
    OnChainFailure {
        channel: &'static str,
        signature: String,
        message: String,
    },

    #[error("no broadcast channels configured")]
    NoChannels,

    #[error("all broadcast channels failed: {}", format_channel_errors(.0))]
    AllChannelsFailed(Vec<BroadcastError>),
}

fn format_channel_errors(errors: &[BroadcastError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Undecodable account credential
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CredentialError {
    #[error("credential is empty")]
    Empty,

    #[error("credential byte array is invalid: {0}")]
    InvalidArray(String),

    #[error("credential string is not valid base58: {0}")]
    InvalidEncoding(String),

    #[error("credential decodes to {0} bytes, expected 64")]
    WrongLength(usize),

    #[error("credential is not a valid keypair: {0}")]
    InvalidKeypair(String),
}

/// Invalid engine configuration
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Lifecycle failures surfaced to the control API
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is still starting")]
    Starting,

    #[error("engine is not running")]
    NotRunning,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no account credentials supplied")]
    MissingCredentials,

    #[error("none of the {supplied} supplied credentials could be decoded")]
    NoValidCredentials { supplied: usize },

    #[error("chain lookup failed during start: {0}")]
    Chain(#[from] ChainError),
}

impl EngineError {
    /// Whether the failure is on the caller's side of the request
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Chain(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_classification() {
        assert!(matches!(
            SourceError::from_response("birdeye", 429, ""),
            SourceError::RateLimited { .. }
        ));
        assert!(matches!(
            SourceError::from_response("birdeye", 401, r#"{"message":"Unauthorized"}"#),
            SourceError::Unauthorized { .. }
        ));

        let err = SourceError::from_response("helius", 503, r#"{"error":"overloaded"}"#);
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "helius returned HTTP 503: overloaded");

        assert!(!SourceError::from_response("helius", 400, "bad request").is_transient());
    }

    #[test]
    fn test_swap_error_no_route() {
        let err = SwapError::from_response(
            400,
            r#"{"error":"Could not find any route","errorCode":"COULD_NOT_FIND_ANY_ROUTE"}"#,
        );
        assert!(matches!(err, SwapError::NoRoute(_)));

        assert!(matches!(SwapError::from_response(429, ""), SwapError::RateLimited));
        assert!(matches!(
            SwapError::from_response(500, "Internal error"),
            SwapError::Venue { status: 500, .. }
        ));
    }

    #[test]
    fn test_all_channels_failed_message() {
        let err = BroadcastError::AllChannelsFailed(vec![
            BroadcastError::Timeout { channel: "relay", seconds: 8 },
            BroadcastError::Rejected {
                channel: "direct",
                message: "blockhash not found".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "all broadcast channels failed: relay timed out after 8s; direct rejected the transaction: blockhash not found"
        );
    }

    #[test]
    fn test_engine_error_sides() {
        assert!(EngineError::AlreadyRunning.is_client_error());
        assert!(EngineError::NoValidCredentials { supplied: 2 }.is_client_error());
        assert!(!EngineError::Chain(ChainError::Timeout).is_client_error());
    }
}
