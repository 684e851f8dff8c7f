//! Operational counters for the auto-sell engine

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountersSnapshot {
    /// Analysis cycles that ran to completion
    pub cycles_run: u64,
    /// Ticks skipped because the previous cycle was still in progress
    pub cycles_skipped: u64,
    /// Cycles where every market data source failed
    pub cycles_without_signal: u64,
    pub triggers_fired: u64,
    pub executions_confirmed: u64,
    pub executions_failed: u64,
    pub webhook_events_accepted: u64,
    pub webhook_events_ignored: u64,
    /// Successful fetches per market data source
    pub source_successes: BTreeMap<String, u64>,
    /// Failed or empty fetches per market data source
    pub source_failures: BTreeMap<String, u64>,
    /// Races won per broadcast channel
    pub broadcast_wins: BTreeMap<String, u64>,
}

/// Thread-safe counters collector
#[derive(Debug, Clone, Default)]
pub struct Counters {
    inner: Arc<CountersInner>,
}

#[derive(Debug, Default)]
struct CountersInner {
    cycles_run: AtomicU64,
    cycles_skipped: AtomicU64,
    cycles_without_signal: AtomicU64,
    triggers_fired: AtomicU64,
    executions_confirmed: AtomicU64,
    executions_failed: AtomicU64,
    webhook_events_accepted: AtomicU64,
    webhook_events_ignored: AtomicU64,
    source_successes: RwLock<BTreeMap<String, u64>>,
    source_failures: RwLock<BTreeMap<String, u64>>,
    broadcast_wins: RwLock<BTreeMap<String, u64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_cycles_run(&self) {
        self.inner.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_skipped(&self) {
        self.inner.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_without_signal(&self) {
        self.inner.cycles_without_signal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_triggers_fired(&self) {
        self.inner.triggers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_executions(&self, confirmed: u64, failed: u64) {
        self.inner.executions_confirmed.fetch_add(confirmed, Ordering::Relaxed);
        self.inner.executions_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn add_webhook_events(&self, accepted: u64, ignored: u64) {
        self.inner.webhook_events_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.inner.webhook_events_ignored.fetch_add(ignored, Ordering::Relaxed);
    }

    pub async fn record_source_success(&self, source: &str) {
        bump(&self.inner.source_successes, source).await;
    }

    pub async fn record_source_failure(&self, source: &str) {
        bump(&self.inner.source_failures, source).await;
    }

    pub async fn record_broadcast_win(&self, channel: &str) {
        bump(&self.inner.broadcast_wins, channel).await;
    }

    pub async fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            cycles_run: self.inner.cycles_run.load(Ordering::Relaxed),
            cycles_skipped: self.inner.cycles_skipped.load(Ordering::Relaxed),
            cycles_without_signal: self.inner.cycles_without_signal.load(Ordering::Relaxed),
            triggers_fired: self.inner.triggers_fired.load(Ordering::Relaxed),
            executions_confirmed: self.inner.executions_confirmed.load(Ordering::Relaxed),
            executions_failed: self.inner.executions_failed.load(Ordering::Relaxed),
            webhook_events_accepted: self.inner.webhook_events_accepted.load(Ordering::Relaxed),
            webhook_events_ignored: self.inner.webhook_events_ignored.load(Ordering::Relaxed),
            source_successes: self.inner.source_successes.read().await.clone(),
            source_failures: self.inner.source_failures.read().await.clone(),
            broadcast_wins: self.inner.broadcast_wins.read().await.clone(),
        }
    }
}

async fn bump(map: &RwLock<BTreeMap<String, u64>>, key: &str) {
    let mut map = map.write().await;
    *map.entry(key.to_string()).or_insert(0) += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_reflects_increments() {
        let counters = Counters::new();
        counters.inc_cycles_run();
        counters.inc_cycles_run();
        counters.add_executions(3, 1);
        counters.record_source_failure("birdeye").await;
        counters.record_source_success("dexscreener").await;
        counters.record_source_success("dexscreener").await;
        counters.record_broadcast_win("relay").await;

        let snapshot = counters.snapshot().await;
        assert_eq!(snapshot.cycles_run, 2);
        assert_eq!(snapshot.executions_confirmed, 3);
        assert_eq!(snapshot.executions_failed, 1);
        assert_eq!(snapshot.source_failures.get("birdeye"), Some(&1));
        assert_eq!(snapshot.source_successes.get("dexscreener"), Some(&2));
        assert_eq!(snapshot.broadcast_wins.get("relay"), Some(&1));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let counters = Counters::new();
        let clone = counters.clone();
        clone.inc_triggers_fired();
        assert_eq!(counters.snapshot().await.triggers_fired, 1);
    }
}
