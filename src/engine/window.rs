//! Sliding window of trade observations
//!
//! Kept in timestamp order so pruning only ever pops from the front.

use crate::types::{ObservationKind, Side, TradeObservation};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct TradeWindow {
    observations: VecDeque<TradeObservation>,
}

impl TradeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    fn contains_signature(&self, signature: &str) -> bool {
        self.observations
            .iter()
            .any(|o| o.signature.as_deref() == Some(signature))
    }

    /// Insert in timestamp order, after any equal timestamps.
    ///
    /// Returns `false` when an observation with the same signature is
    /// already present.
    pub fn insert(&mut self, observation: TradeObservation) -> bool {
        if let Some(signature) = observation.signature.as_deref() {
            if self.contains_signature(signature) {
                return false;
            }
        }

        let at = self
            .observations
            .partition_point(|o| o.timestamp <= observation.timestamp);
        self.observations.insert(at, observation);
        true
    }

    /// Insert many, returning the buy and sell USD of the ones that were new
    pub fn extend<I: IntoIterator<Item = TradeObservation>>(&mut self, observations: I) -> (f64, f64) {
        observations.into_iter().fold((0.0, 0.0), |(buy, sell), o| {
            let (side, usd) = (o.side, o.usd_value);
            match (self.insert(o), side) {
                (true, Side::Buy) => (buy + usd, sell),
                (true, Side::Sell) => (buy, sell + usd),
                (false, _) => (buy, sell),
            }
        })
    }

    /// Remove aggregate estimates, which a newer sample replaces wholesale
    pub fn drop_estimates(&mut self) {
        self.observations.retain(|o| o.kind != ObservationKind::Estimate);
    }

    /// Evict everything older than `window_seconds` before `now`
    pub fn prune(&mut self, now: DateTime<Utc>, window_seconds: u64) -> usize {
        let cutoff = now - Duration::seconds(window_seconds as i64);
        let mut evicted = 0;
        while self
            .observations
            .front()
            .map(|o| o.timestamp < cutoff)
            .unwrap_or(false)
        {
            self.observations.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Buy and sell USD totals
    pub fn totals(&self) -> (f64, f64) {
        self.observations
            .iter()
            .fold((0.0, 0.0), |(buy, sell), o| match o.side {
                Side::Buy => (buy + o.usd_value, sell),
                Side::Sell => (buy, sell + o.usd_value),
            })
    }

    /// Newest `limit` observations, oldest first
    pub fn recent(&self, limit: usize) -> Vec<TradeObservation> {
        let skip = self.observations.len().saturating_sub(limit);
        self.observations.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeObservation> {
        self.observations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(side: Side, usd: f64, ts: DateTime<Utc>, sig: &str) -> TradeObservation {
        TradeObservation::trade(side, usd, ts, Some(sig.to_string()))
    }

    #[test]
    fn test_insert_keeps_timestamp_order() {
        let now = Utc::now();
        let mut window = TradeWindow::new();
        window.insert(obs(Side::Buy, 1.0, now - Duration::seconds(5), "a"));
        window.insert(obs(Side::Buy, 2.0, now - Duration::seconds(20), "b"));
        window.insert(obs(Side::Sell, 3.0, now - Duration::seconds(10), "c"));
        window.insert(obs(Side::Sell, 4.0, now - Duration::seconds(10), "d"));

        let order: Vec<_> = window.iter().map(|o| o.signature.clone().unwrap()).collect();
        assert_eq!(order, vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn test_duplicate_signatures_rejected() {
        let now = Utc::now();
        let mut window = TradeWindow::new();
        assert!(window.insert(obs(Side::Buy, 1.0, now, "a")));
        assert!(!window.insert(obs(Side::Buy, 1.0, now, "a")));
        // unsigned observations never collide
        assert!(window.insert(TradeObservation::trade(Side::Buy, 1.0, now, None)));
        assert!(window.insert(TradeObservation::trade(Side::Buy, 1.0, now, None)));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_extend_reports_only_new_volume() {
        let now = Utc::now();
        let mut window = TradeWindow::new();
        let first = window.extend(vec![obs(Side::Buy, 100.0, now, "a"), obs(Side::Sell, 10.0, now, "b")]);
        assert_eq!(first, (100.0, 10.0));

        // overlapping poll: only "c" is new
        let second = window.extend(vec![
            obs(Side::Buy, 100.0, now, "a"),
            obs(Side::Sell, 10.0, now, "b"),
            obs(Side::Buy, 25.0, now, "c"),
        ]);
        assert_eq!(second, (25.0, 0.0));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_prune_drops_only_expired() {
        let now = Utc::now();
        let mut window = TradeWindow::new();
        for (i, age) in [45, 31, 30, 12, 0].iter().enumerate() {
            window.insert(obs(Side::Buy, 1.0, now - Duration::seconds(*age), &i.to_string()));
        }

        assert_eq!(window.prune(now, 30), 2);
        let cutoff = now - Duration::seconds(30);
        assert!(window.iter().all(|o| o.timestamp >= cutoff));

        let timestamps: Vec<_> = window.iter().map(|o| o.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_totals_and_recent() {
        let now = Utc::now();
        let mut window = TradeWindow::new();
        window.insert(obs(Side::Buy, 70.0, now - Duration::seconds(3), "a"));
        window.insert(obs(Side::Buy, 50.0, now - Duration::seconds(2), "b"));
        window.insert(obs(Side::Sell, 20.0, now - Duration::seconds(1), "c"));

        assert_eq!(window.totals(), (120.0, 20.0));

        let recent = window.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].signature.as_deref(), Some("b"));
        assert_eq!(recent[1].signature.as_deref(), Some("c"));
        assert_eq!(window.recent(10).len(), 3);
    }

    #[test]
    fn test_estimates_are_replaced() {
        let now = Utc::now();
        let mut window = TradeWindow::new();
        window.insert(TradeObservation::estimate(Side::Buy, 40.0, now));
        window.insert(obs(Side::Sell, 5.0, now, "a"));

        window.drop_estimates();
        window.insert(TradeObservation::estimate(Side::Buy, 60.0, now));
        assert_eq!(window.totals(), (60.0, 5.0));
    }
}
