//! Configuration management for the auto-sell service
//!
//! Process-level settings come from the environment (and an optional `.env`).
//! Per-run engine settings arrive with each start request, see
//! [`crate::engine::EngineConfig`].

use crate::sources::SidePolarity;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Mainnet RPC used when `SOLANA_RPC_URL` is not set
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Jupiter v6 swap API
pub const DEFAULT_JUPITER_URL: &str = "https://quote-api.jup.ag/v6";

/// External calls must time out somewhere in this range
const MIN_CALL_TIMEOUT_SECS: u64 = 8;
const MAX_CALL_TIMEOUT_SECS: u64 = 15;

/// Service configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP control API binds to
    pub bind_addr: String,

    /// Solana JSON-RPC endpoint for balances, submission and confirmation
    pub rpc_url: String,

    /// Priority relay endpoint (Jito block engine). Relay racing is off without it.
    pub relay_url: Option<String>,

    /// Optional relay auth token
    pub relay_auth_token: Option<String>,

    /// Jupiter swap API base URL
    pub jupiter_url: String,

    /// Birdeye API key. The Birdeye source is skipped without it.
    pub birdeye_api_key: Option<String>,
    pub birdeye_polarity: SidePolarity,

    /// Helius API key. The Helius source is skipped without it.
    pub helius_api_key: Option<String>,
    pub helius_polarity: SidePolarity,

    pub dexscreener_polarity: SidePolarity,

    /// Shared secret for the trade-feed webhook
    pub webhook_secret: Option<String>,

    /// Per-source timeout for the market data waterfall
    pub source_timeout: Duration,

    /// Broadcast timeouts for the relay and direct channels
    pub relay_timeout: Duration,
    pub direct_timeout: Duration,

    /// Timeout for balance reads and other plain RPC calls
    pub rpc_timeout: Duration,

    /// Default period of the background balance refresh
    pub balance_refresh_seconds: u64,

    /// Priority fee budget passed to the swap builder
    pub priority_fee_lamports: u64,

    /// Extra addresses treated as pools by the transfer classifier
    pub pool_addresses: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            relay_url: None,
            relay_auth_token: None,
            jupiter_url: DEFAULT_JUPITER_URL.to_string(),
            birdeye_api_key: None,
            birdeye_polarity: SidePolarity::Direct,
            helius_api_key: None,
            helius_polarity: SidePolarity::Direct,
            dexscreener_polarity: SidePolarity::Direct,
            webhook_secret: None,
            source_timeout: Duration::from_secs(10),
            relay_timeout: Duration::from_secs(10),
            direct_timeout: Duration::from_secs(12),
            rpc_timeout: Duration::from_secs(8),
            balance_refresh_seconds: 30,
            priority_fee_lamports: 100_000,
            pool_addresses: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            rpc_url: non_empty("SOLANA_RPC_URL").unwrap_or(defaults.rpc_url),
            relay_url: non_empty("JITO_URL"),
            relay_auth_token: non_empty("JITO_AUTH_TOKEN"),
            jupiter_url: non_empty("JUPITER_API_URL").unwrap_or(defaults.jupiter_url),
            birdeye_api_key: non_empty("BIRDEYE_API_KEY"),
            birdeye_polarity: parsed("BIRDEYE_SIDE_POLARITY").unwrap_or(defaults.birdeye_polarity),
            helius_api_key: non_empty("HELIUS_API_KEY"),
            helius_polarity: parsed("HELIUS_SIDE_POLARITY").unwrap_or(defaults.helius_polarity),
            dexscreener_polarity: parsed("DEXSCREENER_SIDE_POLARITY")
                .unwrap_or(defaults.dexscreener_polarity),
            webhook_secret: non_empty("WEBHOOK_SECRET"),
            source_timeout: call_timeout("SOURCE_TIMEOUT_SECONDS", defaults.source_timeout),
            relay_timeout: call_timeout("RELAY_TIMEOUT_SECONDS", defaults.relay_timeout),
            direct_timeout: call_timeout("DIRECT_TIMEOUT_SECONDS", defaults.direct_timeout),
            rpc_timeout: parsed::<u64>("RPC_TIMEOUT_SECONDS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rpc_timeout),
            balance_refresh_seconds: parsed::<u64>("BALANCE_REFRESH_SECONDS")
                .filter(|s| *s > 0)
                .unwrap_or(defaults.balance_refresh_seconds),
            priority_fee_lamports: parsed("PRIORITY_FEE_LAMPORTS")
                .unwrap_or(defaults.priority_fee_lamports),
            pool_addresses: non_empty("POOL_ADDRESSES")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        }
    }

    /// Whether the priority relay channel takes part in broadcast races
    pub fn relay_enabled(&self) -> bool {
        self.relay_url.is_some()
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    non_empty(key).and_then(|v| v.parse().ok())
}

/// Read a timeout in seconds, clamped to the allowed external-call range
fn call_timeout(key: &str, default: Duration) -> Duration {
    parsed::<u64>(key)
        .map(|secs| Duration::from_secs(clamp_call_timeout(secs)))
        .unwrap_or(default)
}

fn clamp_call_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_CALL_TIMEOUT_SECS, MAX_CALL_TIMEOUT_SECS)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_call_timeout() {
        assert_eq!(clamp_call_timeout(1), 8);
        assert_eq!(clamp_call_timeout(10), 10);
        assert_eq!(clamp_call_timeout(60), 15);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" a, b ,,c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.relay_enabled());
        assert_eq!(config.balance_refresh_seconds, 30);
        assert!(config.source_timeout >= Duration::from_secs(MIN_CALL_TIMEOUT_SECS));
    }
}
