//! DexScreener pair-volume source
//!
//! Last resort in the waterfall: DexScreener has no per-trade feed, only
//! rolling pair volume. The most liquid pair's 5-minute volume is split into
//! buy and sell by the buy/sell transaction counts and scaled to the window.
//!
//! Endpoint: `GET https://api.dexscreener.com/latest/dex/tokens/{mint}`

use super::{MarketDataSource, SidePolarity};
use crate::errors::SourceError;
use crate::types::{FlowSample, Side, TradeObservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "dexscreener";
const DEFAULT_BASE_URL: &str = "https://api.dexscreener.com";

/// Span of the `m5` volume bucket
const BUCKET_SECONDS: f64 = 300.0;

#[derive(Debug, Deserialize)]
struct TokensResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    #[serde(default)]
    pub pair_address: String,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub liquidity: Option<Liquidity>,
    #[serde(default)]
    pub volume: Option<Volume>,
    #[serde(default)]
    pub txns: Option<Txns>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Liquidity {
    #[serde(default)]
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub m5: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Txns {
    #[serde(default)]
    pub m5: Option<TxnCounts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxnCounts {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

impl Pair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    /// Parsed USD price, `None` when absent or not positive
    pub fn price(&self) -> Option<f64> {
        self.price_usd
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Pick the pair with the deepest USD liquidity
fn most_liquid(pairs: &[Pair]) -> Option<&Pair> {
    pairs
        .iter()
        .max_by(|a, b| a.liquidity_usd().total_cmp(&b.liquidity_usd()))
}

/// Split the pair's 5-minute volume into (buy, sell) USD scaled to the window
fn estimate_volumes(pair: &Pair, window_seconds: u64) -> (f64, f64) {
    let volume = pair.volume.as_ref().and_then(|v| v.m5).unwrap_or(0.0);
    let counts = pair.txns.as_ref().and_then(|t| t.m5.as_ref());
    let (buys, sells) = counts.map(|c| (c.buys, c.sells)).unwrap_or((0, 0));

    let total = buys + sells;
    if volume <= 0.0 || total == 0 {
        return (0.0, 0.0);
    }

    let scaled = volume * (window_seconds as f64 / BUCKET_SECONDS);
    let buy_share = buys as f64 / total as f64;
    (scaled * buy_share, scaled * (1.0 - buy_share))
}

/// Thin DexScreener HTTP client, also used as the price oracle for Helius
pub struct DexScreenerClient {
    client: Client,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn pairs(&self, mint: &str) -> Result<Vec<Pair>, SourceError> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::from_network_error(NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::from_response(NAME, status.as_u16(), &body));
        }

        let parsed: TokensResponse = response
            .json()
            .await
            .map_err(|e| SourceError::from_network_error(NAME, &e))?;

        Ok(parsed.pairs.unwrap_or_default())
    }

    /// USD price from the most liquid pair
    pub async fn price(&self, mint: &str) -> Result<f64, SourceError> {
        let pairs = self.pairs(mint).await?;
        most_liquid(&pairs)
            .and_then(Pair::price)
            .ok_or(SourceError::MissingPrice { provider: NAME })
    }
}

pub struct DexScreenerSource {
    client: Arc<DexScreenerClient>,
    polarity: SidePolarity,
}

impl DexScreenerSource {
    pub fn new(client: Arc<DexScreenerClient>, polarity: SidePolarity) -> Self {
        Self { client, polarity }
    }
}

/// Build the window estimate sample from a set of pairs
fn sample_from_pairs(
    pairs: &[Pair],
    window_seconds: u64,
    now: DateTime<Utc>,
    polarity: SidePolarity,
) -> Result<FlowSample, SourceError> {
    let pair = most_liquid(pairs).ok_or_else(|| SourceError::Malformed {
        provider: NAME,
        message: "no pairs listed for the asset".to_string(),
    })?;

    let (buy, sell) = estimate_volumes(pair, window_seconds);
    let mut observations = Vec::with_capacity(2);
    if buy > 0.0 {
        observations.push(TradeObservation::estimate(polarity.apply(Side::Buy), buy, now));
    }
    if sell > 0.0 {
        observations.push(TradeObservation::estimate(polarity.apply(Side::Sell), sell, now));
    }

    Ok(FlowSample::from_observations(NAME, observations, pair.price()))
}

#[async_trait]
impl MarketDataSource for DexScreenerSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(
        &self,
        asset: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<FlowSample, SourceError> {
        let pairs = self.client.pairs(asset).await?;
        sample_from_pairs(&pairs, window_seconds, now, self.polarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "schemaVersion": "1.0.0",
        "pairs": [
            {
                "pairAddress": "Shallow",
                "priceUsd": "0.0021",
                "liquidity": { "usd": 5000.0 },
                "volume": { "m5": 900.0 },
                "txns": { "m5": { "buys": 1, "sells": 1 } }
            },
            {
                "pairAddress": "Deep",
                "priceUsd": "0.0020",
                "liquidity": { "usd": 250000.0, "base": 1, "quote": 2 },
                "volume": { "m5": 600.0, "h1": 7000.0 },
                "txns": { "m5": { "buys": 3, "sells": 1 }, "h1": { "buys": 40, "sells": 22 } }
            }
        ]
    }"#;

    fn pairs() -> Vec<Pair> {
        serde_json::from_str::<TokensResponse>(BODY).unwrap().pairs.unwrap()
    }

    #[test]
    fn test_picks_most_liquid_pair() {
        let pairs = pairs();
        let pair = most_liquid(&pairs).unwrap();
        assert_eq!(pair.pair_address, "Deep");
        assert_eq!(pair.price(), Some(0.0020));
    }

    #[test]
    fn test_volume_split_and_scaling() {
        let pairs = pairs();
        let pair = most_liquid(&pairs).unwrap();
        // 600 over 5m scaled to 30s = 60, split 3:1
        let (buy, sell) = estimate_volumes(pair, 30);
        assert!((buy - 45.0).abs() < 1e-9);
        assert!((sell - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_carries_estimates() {
        let now = Utc::now();
        let sample = sample_from_pairs(&pairs(), 30, now, SidePolarity::Direct).unwrap();
        assert_eq!(sample.source, "dexscreener");
        assert_eq!(sample.observations.len(), 2);
        assert!(sample
            .observations
            .iter()
            .all(|o| o.kind == crate::types::ObservationKind::Estimate));
        assert!((sample.buy_volume_usd - 45.0).abs() < 1e-9);

        let inverted = sample_from_pairs(&pairs(), 30, now, SidePolarity::Inverted).unwrap();
        assert!((inverted.sell_volume_usd - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_pairs_is_an_error() {
        let empty: TokensResponse = serde_json::from_str(r#"{"schemaVersion":"1.0.0","pairs":null}"#).unwrap();
        let pairs = empty.pairs.unwrap_or_default();
        assert!(sample_from_pairs(&pairs, 30, Utc::now(), SidePolarity::Direct).is_err());
    }

    #[test]
    fn test_no_trades_gives_empty_sample() {
        let pair: Pair = serde_json::from_str(r#"{"priceUsd":"1.5","volume":{"m5":0}}"#).unwrap();
        let sample = sample_from_pairs(&[pair], 30, Utc::now(), SidePolarity::Direct).unwrap();
        assert!(!sample.has_signal());
        assert_eq!(sample.price_usd, Some(1.5));
    }
}
