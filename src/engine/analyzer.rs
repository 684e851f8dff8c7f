//! Flow analyzer and cooldown gate
//!
//! Pure decision logic: no I/O and no state of its own. The caller owns
//! `last_sell_trigger_at` and only updates it once execution starts.

use super::config::{CooldownScope, EngineConfig};
use crate::types::Metrics;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Why a cycle did not trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum IdleReason {
    BelowThreshold { net_usd_flow: f64, threshold_usd: f64 },
    CoolingDown { remaining_seconds: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerDecision {
    Idle(IdleReason),
    Sell { net_usd_flow: f64, target_usd: f64 },
}

impl TriggerDecision {
    pub fn is_sell(&self) -> bool {
        matches!(self, TriggerDecision::Sell { .. })
    }
}

/// Minimum spacing between two triggers
#[derive(Debug, Clone, Copy)]
pub struct CooldownGate {
    cooldown: Duration,
}

impl CooldownGate {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_seconds as i64),
        }
    }

    /// Seconds left before the gate opens, `None` when open
    pub fn remaining(&self, last_trigger_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
        let last = last_trigger_at?;
        let elapsed = now - last;
        if elapsed >= self.cooldown {
            None
        } else {
            Some((self.cooldown - elapsed).num_seconds().max(1))
        }
    }

    pub fn is_open(&self, last_trigger_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.remaining(last_trigger_at, now).is_none()
    }
}

/// Decide whether the current flow justifies a sell.
///
/// Fires when net flow exceeds the threshold and, with a global cooldown,
/// the gate is open. With per-account cooldowns the gate is applied to each
/// account at selection time instead.
pub fn evaluate(
    metrics: &Metrics,
    config: &EngineConfig,
    last_trigger_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> TriggerDecision {
    let net = metrics.net_usd_flow();
    let threshold = config.threshold_usd();

    if net.is_nan() || net <= threshold {
        return TriggerDecision::Idle(IdleReason::BelowThreshold {
            net_usd_flow: net,
            threshold_usd: threshold,
        });
    }

    if config.cooldown_scope == CooldownScope::Global {
        if let Some(remaining) = CooldownGate::new(config.cooldown_seconds).remaining(last_trigger_at, now) {
            return TriggerDecision::Idle(IdleReason::CoolingDown {
                remaining_seconds: remaining,
            });
        }
    }

    TriggerDecision::Sell {
        net_usd_flow: net,
        target_usd: net * config.sell_fraction,
    }
}
