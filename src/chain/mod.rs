//! On-chain reads and writes
//!
//! The engine reads balances through [`BalanceReader`] so it can be driven
//! against a fake chain in tests.

mod rpc;

pub use rpc::{JsonRpcClient, SignatureStatus, SolanaRpc};

use crate::errors::ChainError;
use async_trait::async_trait;

/// Balance and mint lookups used by the balance refresher and engine start
#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// Native balance in lamports
    async fn native_balance(&self, owner: &str) -> Result<u64, ChainError>;

    /// Asset balance in whole tokens
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64, ChainError>;

    /// Decimal precision of the asset mint
    async fn token_decimals(&self, mint: &str) -> Result<u8, ChainError>;
}

#[async_trait]
impl BalanceReader for SolanaRpc {
    async fn native_balance(&self, owner: &str) -> Result<u64, ChainError> {
        self.get_balance(owner).await
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64, ChainError> {
        self.get_token_balance(owner, mint).await
    }

    async fn token_decimals(&self, mint: &str) -> Result<u8, ChainError> {
        self.get_token_decimals(mint).await
    }
}
