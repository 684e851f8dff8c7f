//! Birdeye per-trade source
//!
//! Highest fidelity source: individual swaps with USD volume and side
//! already attached.

use super::{in_window, MarketDataSource, SidePolarity};
use crate::errors::SourceError;
use crate::types::{FlowSample, Side, TradeObservation};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const NAME: &str = "birdeye";
const DEFAULT_BASE_URL: &str = "https://public-api.birdeye.so";
const PAGE_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
struct TxsResponse {
    #[serde(default)]
    success: bool,
    data: Option<TxsData>,
}

#[derive(Debug, Deserialize)]
struct TxsData {
    #[serde(default)]
    items: Vec<SwapItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapItem {
    tx_hash: String,
    block_unix_time: i64,
    side: String,
    #[serde(rename = "volumeUSD", default)]
    volume_usd: Option<f64>,
    #[serde(default)]
    from: Option<SwapLeg>,
    #[serde(default)]
    to: Option<SwapLeg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapLeg {
    #[serde(default)]
    address: String,
    #[serde(default)]
    ui_amount: Option<f64>,
    #[serde(default)]
    price: Option<f64>,
}

impl SwapLeg {
    fn usd_value(&self) -> Option<f64> {
        match (self.ui_amount, self.price) {
            (Some(amount), Some(price)) => Some(amount * price),
            _ => None,
        }
    }
}

impl SwapItem {
    fn usd_value(&self) -> Option<f64> {
        self.volume_usd
            .or_else(|| self.from.as_ref().and_then(SwapLeg::usd_value))
            .filter(|v| v.is_finite() && *v > 0.0)
    }

    /// Price of the monitored asset, from whichever leg carries it
    fn asset_price(&self, asset: &str) -> Option<f64> {
        [self.from.as_ref(), self.to.as_ref()]
            .into_iter()
            .flatten()
            .find(|leg| leg.address == asset)
            .and_then(|leg| leg.price)
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

pub struct BirdeyeSource {
    client: Client,
    base_url: String,
    api_key: String,
    polarity: SidePolarity,
}

impl BirdeyeSource {
    pub fn new(api_key: impl Into<String>, polarity: SidePolarity, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            polarity,
        }
    }

    async fn fetch_items(&self, asset: &str) -> Result<Vec<SwapItem>, SourceError> {
        let url = format!(
            "{}/defi/txs/token?address={}&tx_type=swap&limit={}",
            self.base_url, asset, PAGE_LIMIT
        );

        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("x-chain", "solana")
            .send()
            .await
            .map_err(|e| SourceError::from_network_error(NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::from_response(NAME, status.as_u16(), &body));
        }

        let parsed: TxsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::from_network_error(NAME, &e))?;

        if !parsed.success {
            return Err(SourceError::Malformed {
                provider: NAME,
                message: "response flagged unsuccessful".to_string(),
            });
        }

        Ok(parsed.data.map(|d| d.items).unwrap_or_default())
    }
}

/// Turn swap items into a sample, keeping only those inside the window
fn sample_from_items(
    items: &[SwapItem],
    asset: &str,
    window_seconds: u64,
    now: DateTime<Utc>,
    polarity: SidePolarity,
) -> FlowSample {
    let mut observations = Vec::new();
    let mut price = None;

    for item in items {
        let Some(timestamp) = Utc.timestamp_opt(item.block_unix_time, 0).single() else {
            continue;
        };
        if !in_window(timestamp, window_seconds, now) {
            continue;
        }
        let (Some(side), Some(usd)) = (Side::parse(&item.side), item.usd_value()) else {
            debug!("[Birdeye] Skipping unusable item {}", item.tx_hash);
            continue;
        };

        if price.is_none() {
            price = item.asset_price(asset);
        }
        observations.push(TradeObservation::trade(
            polarity.apply(side),
            usd,
            timestamp,
            Some(item.tx_hash.clone()),
        ));
    }

    // Items are newest first
    if price.is_none() {
        price = items.iter().find_map(|i| i.asset_price(asset));
    }

    observations.sort_by_key(|o| o.timestamp);
    FlowSample::from_observations(NAME, observations, price)
}

#[async_trait]
impl MarketDataSource for BirdeyeSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(
        &self,
        asset: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<FlowSample, SourceError> {
        let items = self.fetch_items(asset).await?;
        Ok(sample_from_items(&items, asset, window_seconds, now, self.polarity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = "AssetMint";

    fn body(now: i64) -> String {
        format!(
            r#"{{
                "success": true,
                "data": {{
                    "items": [
                        {{
                            "txHash": "t1", "blockUnixTime": {t1}, "side": "buy", "volumeUSD": 120.0,
                            "from": {{ "address": "So11111111111111111111111111111111111111112", "uiAmount": 0.8, "price": 150.0 }},
                            "to": {{ "address": "{asset}", "uiAmount": 60000.0, "price": 0.002 }}
                        }},
                        {{
                            "txHash": "t2", "blockUnixTime": {t2}, "side": "sell",
                            "from": {{ "address": "{asset}", "uiAmount": 10000.0, "price": 0.002 }},
                            "to": {{ "address": "So11111111111111111111111111111111111111112", "uiAmount": 0.13, "price": 150.0 }}
                        }},
                        {{
                            "txHash": "old", "blockUnixTime": {old}, "side": "buy", "volumeUSD": 999.0
                        }}
                    ]
                }}
            }}"#,
            t1 = now - 2,
            t2 = now - 10,
            old = now - 120,
            asset = ASSET
        )
    }

    fn items(now: i64) -> Vec<SwapItem> {
        let parsed: TxsResponse = serde_json::from_str(&body(now)).unwrap();
        parsed.data.unwrap().items
    }

    #[test]
    fn test_window_filter_and_volumes() {
        let now = Utc::now();
        let sample = sample_from_items(&items(now.timestamp()), ASSET, 30, now, SidePolarity::Direct);

        assert_eq!(sample.observations.len(), 2);
        assert_eq!(sample.buy_volume_usd, 120.0);
        // sell volume falls back to from.uiAmount * from.price
        assert!((sample.sell_volume_usd - 20.0).abs() < 1e-9);
        assert_eq!(sample.price_usd, Some(0.002));
        // chronological order
        assert!(sample.observations[0].timestamp <= sample.observations[1].timestamp);
        assert_eq!(sample.observations[1].signature.as_deref(), Some("t1"));
    }

    #[test]
    fn test_inverted_polarity() {
        let now = Utc::now();
        let sample = sample_from_items(&items(now.timestamp()), ASSET, 30, now, SidePolarity::Inverted);
        assert_eq!(sample.sell_volume_usd, 120.0);
        assert!((sample.buy_volume_usd - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_has_no_signal() {
        let now = Utc::now();
        let sample = sample_from_items(&items(now.timestamp() - 600), ASSET, 30, now, SidePolarity::Direct);
        assert!(!sample.has_signal());
    }
}
