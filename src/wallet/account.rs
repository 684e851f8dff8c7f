//! Managed account roster entries

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::fmt;
use std::sync::Arc;

/// Lamports per SOL
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// One independently funded, independently signing account.
///
/// Holds the keypair in memory for the lifetime of a run; it is dropped
/// with the run state on stop.
#[derive(Clone)]
pub struct Account {
    keypair: Arc<Keypair>,
    pubkey: Pubkey,
    /// Cached native balance in SOL
    pub native_balance_sol: f64,
    /// Cached asset balance in whole tokens
    pub token_balance: f64,
    /// Per-account throttle, only used with per-account cooldowns
    pub cooldown_until: Option<DateTime<Utc>>,
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Instant `token_balance` was last known to match the chain
    pub token_balance_as_of: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(keypair: Keypair) -> Self {
        let pubkey = keypair.pubkey();
        Self {
            keypair: Arc::new(keypair),
            pubkey,
            native_balance_sol: 0.0,
            token_balance: 0.0,
            cooldown_until: None,
            refreshed_at: None,
            token_balance_as_of: None,
        }
    }

    pub fn pubkey(&self) -> &Pubkey {
        &self.pubkey
    }

    /// Base58 public identifier
    pub fn public_id(&self) -> String {
        self.pubkey.to_string()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn set_native_lamports(&mut self, lamports: u64) {
        self.native_balance_sol = lamports as f64 / LAMPORTS_PER_SOL;
    }

    /// Whether a per-account cooldown still blocks this account
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    /// Public view for API responses
    pub fn status(&self) -> AccountStatus {
        AccountStatus {
            public_id: self.public_id(),
            native_balance_sol: self.native_balance_sol,
            token_balance: self.token_balance,
            cooldown_until: self.cooldown_until,
            refreshed_at: self.refreshed_at,
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("pubkey", &self.pubkey)
            .field("keypair", &"<redacted>")
            .field("native_balance_sol", &self.native_balance_sol)
            .field("token_balance", &self.token_balance)
            .field("cooldown_until", &self.cooldown_until)
            .finish()
    }
}

/// Account fields safe to return from the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub public_id: String,
    pub native_balance_sol: f64,
    pub token_balance: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_debug_redacts_keypair() {
        let keypair = Keypair::new();
        let secret = keypair.to_base58_string();
        let account = Account::new(keypair);

        let rendered = format!("{:?}", account);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&secret));
    }

    #[test]
    fn test_cooldown_window() {
        let now = Utc::now();
        let mut account = Account::new(Keypair::new());
        assert!(!account.is_cooling_down(now));

        account.cooldown_until = Some(now + Duration::seconds(30));
        assert!(account.is_cooling_down(now));
        assert!(!account.is_cooling_down(now + Duration::seconds(30)));
    }

    #[test]
    fn test_native_lamports() {
        let mut account = Account::new(Keypair::new());
        account.set_native_lamports(1_500_000_000);
        assert_eq!(account.native_balance_sol, 1.5);
    }
}
