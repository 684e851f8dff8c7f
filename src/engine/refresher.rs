//! Balance refresher
//!
//! Reads happen without touching engine state; the caller applies the
//! snapshots afterwards. A failed read keeps the last known value, and a
//! token read that started before the cached balance last changed is
//! dropped.

use crate::chain::BalanceReader;
use crate::errors::ChainError;
use crate::wallet::Account;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fresh balances for one account, `None` where the read failed
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    pub public_id: String,
    pub native_lamports: Option<u64>,
    pub token_balance: Option<f64>,
    /// When the reads were issued
    pub read_at: DateTime<Utc>,
}

pub struct BalanceRefresher {
    reader: Arc<dyn BalanceReader>,
    timeout: Duration,
}

impl BalanceRefresher {
    pub fn new(reader: Arc<dyn BalanceReader>, timeout: Duration) -> Self {
        Self { reader, timeout }
    }

    /// Decimal precision of the asset mint, bounded by the read timeout
    pub async fn decimals(&self, mint: &str) -> Result<u8, ChainError> {
        tokio::time::timeout(self.timeout, self.reader.token_decimals(mint))
            .await
            .unwrap_or(Err(ChainError::Timeout))
    }

    /// Read native and token balances for every account concurrently
    pub async fn read(&self, public_ids: &[String], mint: &str) -> Vec<BalanceSnapshot> {
        join_all(public_ids.iter().map(|id| self.read_one(id, mint))).await
    }

    async fn read_one(&self, public_id: &str, mint: &str) -> BalanceSnapshot {
        let read_at = Utc::now();
        let native = tokio::time::timeout(self.timeout, self.reader.native_balance(public_id));
        let token = tokio::time::timeout(self.timeout, self.reader.token_balance(public_id, mint));
        let (native, token) = tokio::join!(native, token);

        let native_lamports = match native {
            Ok(Ok(lamports)) => Some(lamports),
            Ok(Err(e)) => {
                warn!("[Balances] Native balance read failed for {}: {}", public_id, e);
                None
            }
            Err(_) => {
                warn!("[Balances] Native balance read timed out for {}", public_id);
                None
            }
        };

        let token_balance = match token {
            Ok(Ok(balance)) => Some(balance),
            Ok(Err(e)) => {
                warn!("[Balances] Token balance read failed for {}: {}", public_id, e);
                None
            }
            Err(_) => {
                warn!("[Balances] Token balance read timed out for {}", public_id);
                None
            }
        };

        BalanceSnapshot {
            public_id: public_id.to_string(),
            native_lamports,
            token_balance,
            read_at,
        }
    }
}

/// Write snapshots into the matching accounts, keeping last-known values
/// where a read failed. Returns how many accounts were updated.
pub fn apply_snapshots(accounts: &mut [Account], snapshots: &[BalanceSnapshot], now: DateTime<Utc>) -> usize {
    let mut updated = 0;
    for snapshot in snapshots {
        let Some(account) = accounts.iter_mut().find(|a| a.public_id() == snapshot.public_id) else {
            continue;
        };
        if let Some(lamports) = snapshot.native_lamports {
            account.set_native_lamports(lamports);
        }
        let token_balance = snapshot.token_balance.filter(|_| {
            let stale = account.token_balance_as_of.is_some_and(|at| at > snapshot.read_at);
            if stale {
                debug!("[Balances] Dropping stale token read for {}", snapshot.public_id);
            }
            !stale
        });
        if let Some(balance) = token_balance {
            account.token_balance = balance;
            account.token_balance_as_of = Some(snapshot.read_at);
        }
        if snapshot.native_lamports.is_some() || token_balance.is_some() {
            account.refreshed_at = Some(now);
            updated += 1;
        }
    }
    debug!("[Balances] Refreshed {}/{} accounts", updated, snapshots.len());
    updated
}
