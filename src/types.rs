//! Core data types shared by the market-data, engine and API layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a trade relative to the monitored asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parse a provider side label ("buy"/"sell", any case)
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// How an observation entered the trade window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ObservationKind {
    /// Individual trade reported by a polled source
    Trade,
    /// Window-wide estimate from an aggregate volume source.
    /// Each new sample supersedes the previous estimates.
    Estimate,
    /// Trade pushed through the webhook
    Pushed,
}

/// One buy or sell observed for the asset
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeObservation {
    pub side: Side,
    pub usd_value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub kind: ObservationKind,
}

impl TradeObservation {
    pub fn trade(side: Side, usd_value: f64, timestamp: DateTime<Utc>, signature: Option<String>) -> Self {
        Self {
            side,
            usd_value,
            timestamp,
            signature,
            kind: ObservationKind::Trade,
        }
    }

    pub fn pushed(side: Side, usd_value: f64, timestamp: DateTime<Utc>, signature: String) -> Self {
        Self {
            side,
            usd_value,
            timestamp,
            signature: Some(signature),
            kind: ObservationKind::Pushed,
        }
    }

    pub fn estimate(side: Side, usd_value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            side,
            usd_value,
            timestamp,
            signature: None,
            kind: ObservationKind::Estimate,
        }
    }
}

/// A normalized result from one market-data source
#[derive(Debug, Clone)]
pub struct FlowSample {
    /// Adapter that produced the sample
    pub source: &'static str,
    pub buy_volume_usd: f64,
    pub sell_volume_usd: f64,
    /// Asset price in USD, when the provider exposes one
    pub price_usd: Option<f64>,
    pub observations: Vec<TradeObservation>,
}

impl FlowSample {
    /// Build a sample whose volumes are the sums of its observations
    pub fn from_observations(
        source: &'static str,
        observations: Vec<TradeObservation>,
        price_usd: Option<f64>,
    ) -> Self {
        let (buy, sell) = observations.iter().fold((0.0, 0.0), |(buy, sell), o| match o.side {
            Side::Buy => (buy + o.usd_value, sell),
            Side::Sell => (buy, sell + o.usd_value),
        });

        Self {
            source,
            buy_volume_usd: buy,
            sell_volume_usd: sell,
            price_usd,
            observations,
        }
    }

    /// Whether the sample carries any buy or sell volume
    pub fn has_signal(&self) -> bool {
        self.buy_volume_usd > 0.0 || self.sell_volume_usd > 0.0
    }
}

/// Aggregate flow metrics of a running engine.
///
/// Buy/sell volumes are private so that `net_usd_flow` can only change
/// together with them.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    buy_volume_usd: f64,
    sell_volume_usd: f64,
    net_usd_flow: f64,
    pub current_price_usd: Option<f64>,
    pub last_sell_trigger_at: Option<DateTime<Utc>>,
    pub total_sold_tokens: f64,
    pub total_sold_usd: f64,
    pub last_source: Option<String>,
    pub last_collected_at: Option<DateTime<Utc>>,
}

impl Metrics {
    pub fn buy_volume_usd(&self) -> f64 {
        self.buy_volume_usd
    }

    pub fn sell_volume_usd(&self) -> f64 {
        self.sell_volume_usd
    }

    pub fn net_usd_flow(&self) -> f64 {
        self.net_usd_flow
    }

    pub fn set_volumes(&mut self, buy_volume_usd: f64, sell_volume_usd: f64) {
        self.buy_volume_usd = buy_volume_usd;
        self.sell_volume_usd = sell_volume_usd;
        self.net_usd_flow = buy_volume_usd - sell_volume_usd;
    }

    pub fn add_volumes(&mut self, buy_volume_usd: f64, sell_volume_usd: f64) {
        self.set_volumes(
            self.buy_volume_usd + buy_volume_usd,
            self.sell_volume_usd + sell_volume_usd,
        );
    }

    pub fn reset_volumes(&mut self) {
        self.set_volumes(0.0, 0.0);
    }
}

/// Stage at which a per-account sell stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStage {
    Quote,
    Build,
    Sign,
    Broadcast,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStage::Quote => "quote",
            ExecutionStage::Build => "build",
            ExecutionStage::Sign => "sign",
            ExecutionStage::Broadcast => "broadcast",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one account's sell
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExecutionOutcome {
    Confirmed {
        signature: String,
        channel: String,
    },
    Failed {
        stage: ExecutionStage,
        error: String,
    },
}

/// Result of one account's part in an execution batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerAccountResult {
    pub account: String,
    pub tokens_requested: f64,
    /// Requested amount after truncation to base units
    pub tokens_sent: f64,
    pub outcome: ExecutionOutcome,
    pub finished_at: DateTime<Utc>,
}

impl PerAccountResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Confirmed { .. })
    }

    pub fn signature(&self) -> Option<&str> {
        match &self.outcome {
            ExecutionOutcome::Confirmed { signature, .. } => Some(signature),
            ExecutionOutcome::Failed { .. } => None,
        }
    }
}
