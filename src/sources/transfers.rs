//! Buy/sell classification of raw token transfers
//!
//! Shared by the Helius adapter and the webhook feed. A transfer of the asset
//! into a pool-like address is a sell, out of one is a buy. When neither leg
//! is a known pool the transaction's fee payer stands in for the trader.

use super::helius::EnhancedTransaction;
use crate::types::Side;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;

/// One transaction's net movement of the asset, from the trader's side
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTransfer {
    pub side: Side,
    /// Net token amount in whole tokens
    pub tokens: f64,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TransferClassifier {
    pool_addresses: HashSet<String>,
}

impl TransferClassifier {
    pub fn new<I, S>(pool_addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pool_addresses: pool_addresses.into_iter().map(Into::into).collect(),
        }
    }

    fn is_pool(&self, address: &str) -> bool {
        self.pool_addresses.contains(address)
    }

    /// Side of a single transfer leg, `None` when direction can't be told
    fn leg_side(&self, from: &str, to: &str, fee_payer: &str) -> Option<Side> {
        if self.is_pool(to) {
            Some(Side::Sell)
        } else if self.is_pool(from) {
            Some(Side::Buy)
        } else if !fee_payer.is_empty() && to == fee_payer {
            Some(Side::Buy)
        } else if !fee_payer.is_empty() && from == fee_payer {
            Some(Side::Sell)
        } else {
            None
        }
    }

    /// Net the asset's transfers within one transaction into a single side.
    ///
    /// Returns `None` when the transaction doesn't move the asset, nets to
    /// zero, or has an unusable timestamp.
    pub fn classify(&self, tx: &EnhancedTransaction, mint: &str) -> Option<ClassifiedTransfer> {
        let mut net = 0.0;
        let mut matched = false;

        for transfer in tx.token_transfers.iter().filter(|t| t.mint == mint) {
            if !transfer.token_amount.is_finite() || transfer.token_amount <= 0.0 {
                continue;
            }
            match self.leg_side(
                &transfer.from_user_account,
                &transfer.to_user_account,
                &tx.fee_payer,
            ) {
                Some(Side::Buy) => {
                    net += transfer.token_amount;
                    matched = true;
                }
                Some(Side::Sell) => {
                    net -= transfer.token_amount;
                    matched = true;
                }
                None => {}
            }
        }

        if !matched || net == 0.0 {
            return None;
        }

        let timestamp = Utc.timestamp_opt(tx.timestamp, 0).single()?;
        let side = if net > 0.0 { Side::Buy } else { Side::Sell };

        Some(ClassifiedTransfer {
            side,
            tokens: net.abs(),
            signature: tx.signature.clone(),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::helius::TokenTransfer;

    const MINT: &str = "Mint111";

    fn transfer(from: &str, to: &str, amount: f64) -> TokenTransfer {
        TokenTransfer {
            mint: MINT.to_string(),
            from_user_account: from.to_string(),
            to_user_account: to.to_string(),
            token_amount: amount,
        }
    }

    fn tx(fee_payer: &str, transfers: Vec<TokenTransfer>) -> EnhancedTransaction {
        EnhancedTransaction {
            signature: "sig1".to_string(),
            timestamp: 1_700_000_000,
            fee_payer: fee_payer.to_string(),
            token_transfers: transfers,
        }
    }

    #[test]
    fn test_pool_direction_wins() {
        let classifier = TransferClassifier::new(["Pool"]);

        let sell = classifier.classify(&tx("Trader", vec![transfer("Trader", "Pool", 50.0)]), MINT).unwrap();
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(sell.tokens, 50.0);

        let buy = classifier.classify(&tx("Trader", vec![transfer("Pool", "Trader", 20.0)]), MINT).unwrap();
        assert_eq!(buy.side, Side::Buy);
    }

    #[test]
    fn test_fee_payer_fallback() {
        let classifier = TransferClassifier::default();
        let buy = classifier.classify(&tx("Trader", vec![transfer("Vault", "Trader", 10.0)]), MINT).unwrap();
        assert_eq!(buy.side, Side::Buy);

        let sell = classifier.classify(&tx("Trader", vec![transfer("Trader", "Vault", 10.0)]), MINT).unwrap();
        assert_eq!(sell.side, Side::Sell);

        assert!(classifier.classify(&tx("Other", vec![transfer("A", "B", 10.0)]), MINT).is_none());
    }

    #[test]
    fn test_nets_within_transaction() {
        let classifier = TransferClassifier::new(["Pool"]);
        let result = classifier
            .classify(
                &tx(
                    "Trader",
                    vec![transfer("Pool", "Trader", 30.0), transfer("Trader", "Pool", 10.0)],
                ),
                MINT,
            )
            .unwrap();
        assert_eq!(result.side, Side::Buy);
        assert_eq!(result.tokens, 20.0);

        let flat = tx(
            "Trader",
            vec![transfer("Pool", "Trader", 5.0), transfer("Trader", "Pool", 5.0)],
        );
        assert!(classifier.classify(&flat, MINT).is_none());
    }

    #[test]
    fn test_ignores_other_mints() {
        let classifier = TransferClassifier::new(["Pool"]);
        let mut other = transfer("Pool", "Trader", 30.0);
        other.mint = "OtherMint".to_string();
        assert!(classifier.classify(&tx("Trader", vec![other]), MINT).is_none());
    }
}
