//! Helius enhanced-transaction source
//!
//! Scans recent swaps touching the mint and classifies each one from its raw
//! token transfers. Helius reports token amounts only, so USD values come
//! from the DexScreener price.

use super::dexscreener::DexScreenerClient;
use super::transfers::TransferClassifier;
use super::{in_window, MarketDataSource, SidePolarity};
use crate::errors::SourceError;
use crate::types::{FlowSample, TradeObservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "helius";
const DEFAULT_BASE_URL: &str = "https://api.helius.xyz";

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Enhanced transaction as returned by the Helius API and its webhooks
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedTransaction {
    pub signature: String,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fee_payer: String,
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mint: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub from_user_account: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub to_user_account: String,
    #[serde(default)]
    pub token_amount: f64,
}

pub struct HeliusSource {
    client: Client,
    base_url: String,
    api_key: String,
    classifier: Arc<TransferClassifier>,
    prices: Arc<DexScreenerClient>,
    polarity: SidePolarity,
}

impl HeliusSource {
    pub fn new(
        api_key: impl Into<String>,
        classifier: Arc<TransferClassifier>,
        prices: Arc<DexScreenerClient>,
        polarity: SidePolarity,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            classifier,
            prices,
            polarity,
        }
    }

    async fn fetch_transactions(&self, asset: &str) -> Result<Vec<EnhancedTransaction>, SourceError> {
        let url = format!("{}/v0/addresses/{}/transactions", self.base_url, asset);

        let response = self
            .client
            .get(&url)
            .query(&[("api-key", self.api_key.as_str()), ("type", "SWAP")])
            .send()
            .await
            .map_err(|e| SourceError::from_network_error(NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::from_response(NAME, status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::from_network_error(NAME, &e))
    }
}

/// Classify transactions and value them at `price`
fn sample_from_transactions(
    transactions: &[EnhancedTransaction],
    classifier: &TransferClassifier,
    asset: &str,
    price: f64,
    window_seconds: u64,
    now: DateTime<Utc>,
    polarity: SidePolarity,
) -> FlowSample {
    let mut observations: Vec<TradeObservation> = transactions
        .iter()
        .filter_map(|tx| classifier.classify(tx, asset))
        .filter(|t| in_window(t.timestamp, window_seconds, now))
        .map(|t| {
            TradeObservation::trade(
                polarity.apply(t.side),
                t.tokens * price,
                t.timestamp,
                Some(t.signature),
            )
        })
        .collect();

    observations.sort_by_key(|o| o.timestamp);
    FlowSample::from_observations(NAME, observations, Some(price))
}

#[async_trait]
impl MarketDataSource for HeliusSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(
        &self,
        asset: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<FlowSample, SourceError> {
        let (transactions, price) =
            tokio::try_join!(self.fetch_transactions(asset), self.prices.price(asset))?;

        Ok(sample_from_transactions(
            &transactions,
            &self.classifier,
            asset,
            price,
            window_seconds,
            now,
            self.polarity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = "AssetMint";

    fn transactions(now: i64) -> Vec<EnhancedTransaction> {
        let body = format!(
            r#"[
                {{
                    "signature": "buy1",
                    "timestamp": {t1},
                    "feePayer": "Trader1",
                    "type": "SWAP",
                    "tokenTransfers": [
                        {{ "mint": "So11111111111111111111111111111111111111112", "fromUserAccount": "Trader1", "toUserAccount": "Pool", "tokenAmount": 1.0 }},
                        {{ "mint": "{asset}", "fromUserAccount": "Pool", "toUserAccount": "Trader1", "tokenAmount": 5000.0 }}
                    ]
                }},
                {{
                    "signature": "sell1",
                    "timestamp": {t2},
                    "feePayer": "Trader2",
                    "tokenTransfers": [
                        {{ "mint": "{asset}", "fromUserAccount": "Trader2", "toUserAccount": null, "tokenAmount": 1000.0 }}
                    ]
                }},
                {{
                    "signature": "stale",
                    "timestamp": {old},
                    "feePayer": "Trader3",
                    "tokenTransfers": [
                        {{ "mint": "{asset}", "fromUserAccount": "Pool", "toUserAccount": "Trader3", "tokenAmount": 9000.0 }}
                    ]
                }}
            ]"#,
            t1 = now - 3,
            t2 = now - 1,
            old = now - 100,
            asset = ASSET
        );
        serde_json::from_str(&body).unwrap()
    }

    #[test]
    fn test_classifies_and_values_transfers() {
        let now = Utc::now();
        let classifier = TransferClassifier::new(["Pool"]);
        let sample = sample_from_transactions(
            &transactions(now.timestamp()),
            &classifier,
            ASSET,
            0.01,
            30,
            now,
            SidePolarity::Direct,
        );

        assert_eq!(sample.observations.len(), 2);
        assert!((sample.buy_volume_usd - 50.0).abs() < 1e-9);
        assert!((sample.sell_volume_usd - 10.0).abs() < 1e-9);
        assert_eq!(sample.price_usd, Some(0.01));
        assert_eq!(sample.observations[0].signature.as_deref(), Some("buy1"));
    }

    #[test]
    fn test_null_accounts_deserialize() {
        let txs = transactions(Utc::now().timestamp());
        assert_eq!(txs[1].token_transfers[0].to_user_account, "");
    }
}
