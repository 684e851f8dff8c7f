//! Execution coordinator - sizes a sell across the account pool and runs it
//!
//! Sizing is pure ([`plan_sell`]). Execution fans out one quote/build/sign/
//! broadcast pipeline per account; a failure in one never touches the others.

use super::config::{CooldownScope, EngineConfig};
use crate::execution::{from_base_units, sign_transfer, to_base_units, BroadcastRacer, SwapVenue};
use crate::types::{ExecutionOutcome, ExecutionStage, PerAccountResult};
use crate::wallet::Account;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One account's share of a sell
#[derive(Debug, Clone)]
pub struct PlannedSell {
    pub account: Account,
    /// Whole tokens
    pub tokens: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SellPlan {
    /// Tokens held across eligible accounts
    pub total_held: f64,
    /// Tokens the batch aims to sell after clamping
    pub total_to_sell: f64,
    pub sells: Vec<PlannedSell>,
}

impl SellPlan {
    pub fn is_empty(&self) -> bool {
        self.sells.is_empty()
    }
}

/// Whether an account may take part in a sell at `now`
pub fn is_eligible(account: &Account, config: &EngineConfig, now: DateTime<Utc>) -> bool {
    if account.token_balance.is_nan() || account.token_balance <= config.dust_floor {
        return false;
    }
    match config.cooldown_scope {
        CooldownScope::Global => true,
        CooldownScope::PerAccount => !account.is_cooling_down(now),
    }
}

/// Split a USD sell target into per-account token amounts.
///
/// The batch is clamped to `[min_sell_fraction, max_sell_fraction]` of the
/// eligible holdings, then allocated pro rata to each account's balance and
/// capped at that balance.
pub fn plan_sell(
    target_usd: f64,
    price_usd: f64,
    accounts: &[Account],
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> SellPlan {
    if !(price_usd.is_finite() && price_usd > 0.0) || !(target_usd.is_finite() && target_usd > 0.0) {
        return SellPlan::default();
    }

    let eligible: Vec<&Account> = accounts.iter().filter(|a| is_eligible(a, config, now)).collect();
    let total_held: f64 = eligible.iter().map(|a| a.token_balance).sum();
    if eligible.is_empty() || total_held <= 0.0 {
        return SellPlan::default();
    }

    let floor = total_held * config.min_sell_fraction;
    let ceiling = total_held * config.max_sell_fraction;
    let total_to_sell = (target_usd / price_usd).clamp(floor, ceiling);

    let sells = eligible
        .into_iter()
        .map(|account| {
            let share = total_to_sell * (account.token_balance / total_held);
            PlannedSell {
                account: account.clone(),
                tokens: share.min(account.token_balance),
            }
        })
        .filter(|s| s.tokens > 0.0)
        .collect();

    SellPlan {
        total_held,
        total_to_sell,
        sells,
    }
}

/// Static inputs shared by every account in a batch
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub asset: String,
    pub decimals: u8,
    pub slippage_bps: u16,
}

pub struct ExecutionCoordinator {
    venue: Arc<dyn SwapVenue>,
    racer: Arc<BroadcastRacer>,
}

impl ExecutionCoordinator {
    pub fn new(venue: Arc<dyn SwapVenue>, racer: Arc<BroadcastRacer>) -> Self {
        Self { venue, racer }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.racer.channel_names()
    }

    /// Run every planned sell concurrently and collect each outcome.
    ///
    /// Allocations that truncate to zero base units are skipped and produce
    /// no result.
    pub async fn run_plan(&self, plan: &SellPlan, ctx: &ExecutionContext) -> Vec<PerAccountResult> {
        if plan.is_empty() {
            return Vec::new();
        }

        let runs = plan.sells.iter().filter_map(|sell| {
            let amount = to_base_units(sell.tokens, ctx.decimals);
            if amount == 0 {
                debug!(
                    "[Coordinator] Skipping {}: {} tokens rounds to zero",
                    sell.account.public_id(),
                    sell.tokens
                );
                return None;
            }
            Some(self.execute_one(sell, amount, ctx))
        });

        let results = join_all(runs).await;

        let confirmed = results.iter().filter(|r| r.is_confirmed()).count();
        info!(
            "[Coordinator] Batch finished: {}/{} accounts confirmed",
            confirmed,
            results.len()
        );
        results
    }

    async fn execute_one(&self, sell: &PlannedSell, amount: u64, ctx: &ExecutionContext) -> PerAccountResult {
        let account = &sell.account;
        let outcome = match self.sell_pipeline(account, amount, ctx).await {
            Ok((signature, channel)) => ExecutionOutcome::Confirmed { signature, channel },
            Err((stage, error)) => {
                warn!(
                    "[Coordinator] {} failed at {}: {}",
                    account.public_id(),
                    stage,
                    error
                );
                ExecutionOutcome::Failed { stage, error }
            }
        };

        PerAccountResult {
            account: account.public_id(),
            tokens_requested: sell.tokens,
            tokens_sent: from_base_units(amount, ctx.decimals),
            outcome,
            finished_at: Utc::now(),
        }
    }

    async fn sell_pipeline(
        &self,
        account: &Account,
        amount: u64,
        ctx: &ExecutionContext,
    ) -> Result<(String, String), (ExecutionStage, String)> {
        let quote = self
            .venue
            .quote(&ctx.asset, amount, ctx.slippage_bps)
            .await
            .map_err(|e| (ExecutionStage::Quote, e.to_string()))?;

        let unsigned = self
            .venue
            .build(&quote, account.pubkey())
            .await
            .map_err(|e| (ExecutionStage::Build, e.to_string()))?;

        let signed = sign_transfer(&unsigned, account.keypair())
            .map_err(|e| (ExecutionStage::Sign, e.to_string()))?;

        let confirmation = self
            .racer
            .broadcast(&signed)
            .await
            .map_err(|e| (ExecutionStage::Broadcast, e.to_string()))?;

        Ok((confirmation.signature, confirmation.channel.to_string()))
    }
}
