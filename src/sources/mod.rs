//! Market data source adapters
//!
//! Each adapter wraps one external provider of trade or volume data for the
//! asset and normalizes it into a [`FlowSample`]. The aggregator tries them in
//! priority order.

pub mod aggregator;
pub mod birdeye;
pub mod dexscreener;
pub mod helius;
pub mod transfers;

pub use aggregator::Aggregator;
pub use birdeye::BirdeyeSource;
pub use dexscreener::{DexScreenerClient, DexScreenerSource};
pub use helius::{EnhancedTransaction, HeliusSource, TokenTransfer};
pub use transfers::{ClassifiedTransfer, TransferClassifier};

use crate::errors::SourceError;
use crate::types::{FlowSample, Side};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// One provider of buy/sell activity for an asset
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short stable name used in logs and counters
    fn name(&self) -> &'static str;

    /// Fetch activity for `asset` over the `window_seconds` ending at `now`
    async fn fetch(
        &self,
        asset: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<FlowSample, SourceError>;
}

/// How a provider's side labels map onto canonical sides.
///
/// `Inverted` exists for providers that label trades from the pool's point
/// of view instead of the trader's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidePolarity {
    #[default]
    Direct,
    Inverted,
}

impl SidePolarity {
    /// Map a provider-reported side to the canonical side
    pub fn apply(self, side: Side) -> Side {
        match self {
            SidePolarity::Direct => side,
            SidePolarity::Inverted => side.opposite(),
        }
    }
}

impl FromStr for SidePolarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(SidePolarity::Direct),
            "inverted" => Ok(SidePolarity::Inverted),
            other => Err(format!("unknown side polarity '{}'", other)),
        }
    }
}

impl fmt::Display for SidePolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SidePolarity::Direct => write!(f, "direct"),
            SidePolarity::Inverted => write!(f, "inverted"),
        }
    }
}

/// Whether `timestamp` falls inside the window ending at `now`
pub(crate) fn in_window(timestamp: DateTime<Utc>, window_seconds: u64, now: DateTime<Utc>) -> bool {
    timestamp >= now - chrono::Duration::seconds(window_seconds as i64) && timestamp <= now
}
