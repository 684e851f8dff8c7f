//! Market data waterfall
//!
//! Sources are tried strictly in priority order. The first one that answers
//! inside its timeout with non-zero volume wins; the rest are not called.

use super::MarketDataSource;
use crate::errors::{AggregateError, SourceError};
use crate::services::Counters;
use crate::types::FlowSample;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Aggregator {
    sources: Vec<Arc<dyn MarketDataSource>>,
    timeout: Duration,
    counters: Counters,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn MarketDataSource>>, timeout: Duration, counters: Counters) -> Self {
        Self {
            sources,
            timeout,
            counters,
        }
    }

    /// Names of the configured sources, highest priority first
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn collect(
        &self,
        asset: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<FlowSample, AggregateError> {
        if self.sources.is_empty() {
            return Err(AggregateError::NoSources);
        }

        let mut failures = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let name = source.name();
            let result = tokio::time::timeout(self.timeout, source.fetch(asset, window_seconds, now))
                .await
                .unwrap_or_else(|_| {
                    Err(SourceError::Timeout {
                        provider: name,
                        seconds: self.timeout.as_secs(),
                    })
                });

            match result {
                Ok(sample) if sample.has_signal() => {
                    debug!(
                        "[Aggregator] {} buy=${:.2} sell=${:.2}",
                        name, sample.buy_volume_usd, sample.sell_volume_usd
                    );
                    self.counters.record_source_success(name).await;
                    return Ok(sample);
                }
                Ok(_) => {
                    debug!("[Aggregator] {} reported no activity, falling back", name);
                    self.counters.record_source_failure(name).await;
                    failures.push(format!("{} reported no activity", name));
                }
                Err(e) => {
                    if e.is_transient() {
                        info!("[Aggregator] {} unavailable: {}", name, e);
                    } else {
                        warn!("[Aggregator] {} failed: {}", name, e);
                    }
                    self.counters.record_source_failure(name).await;
                    failures.push(e.to_string());
                }
            }
        }

        Err(AggregateError::AllSourcesFailed { failures })
    }
}
