//! Engine lifecycle controller
//!
//! Owns the single run of the auto-sell engine. All mutable run state sits
//! behind one lock that is never held across network I/O; every write-back
//! after an await checks the run generation so results from a stopped run
//! are dropped instead of applied.

use super::analyzer::{self, IdleReason, TriggerDecision};
use super::config::{CooldownScope, EngineConfig, VolumeMode};
use super::coordinator::{plan_sell, ExecutionContext, ExecutionCoordinator};
use super::refresher::{apply_snapshots, BalanceRefresher};
use super::scheduler::Scheduler;
use super::window::TradeWindow;
use crate::chain::SolanaRpc;
use crate::config::Config;
use crate::errors::EngineError;
use crate::execution::{BroadcastChannel, BroadcastRacer, DirectChannel, JupiterClient, RelayChannel};
use crate::services::{Counters, CountersSnapshot};
use crate::sources::{
    in_window, Aggregator, BirdeyeSource, DexScreenerClient, DexScreenerSource, EnhancedTransaction,
    HeliusSource, MarketDataSource, TransferClassifier,
};
use crate::types::{FlowSample, Metrics, PerAccountResult, Side, TradeObservation};
use crate::wallet::{decode_credentials, Account, AccountStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Execution results kept for status, newest first
const EXECUTION_LOG_CAPACITY: usize = 100;

/// Observations returned in a status response
const STATUS_WINDOW_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnginePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// What one analysis cycle ended with
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CycleOutcome {
    /// Every source failed; volumes were reset
    NoSignal,
    Idle(IdleReason),
    /// Trigger fired but no usable price is known
    NoPrice,
    NoEligibleAccounts,
    Executed { confirmed: usize, failed: usize },
    /// The run this cycle belonged to has ended
    Superseded,
}

/// Returned by a successful start
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSummary {
    pub run_id: Uuid,
    pub config: EngineConfig,
    pub decimals: u8,
    pub accounts: Vec<AccountStatus>,
    /// Credentials that failed to decode
    pub rejected_credentials: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSummary {
    pub run_id: Uuid,
    pub ran_for_seconds: i64,
    pub total_sold_tokens: f64,
    pub total_sold_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub accepted: usize,
    pub ignored: usize,
}

/// Full engine status for the control API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub phase: EnginePhase,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub config: Option<EngineConfig>,
    pub metrics: Option<Metrics>,
    pub recent_trade_window: Vec<TradeObservation>,
    pub per_account_status: Vec<AccountStatus>,
    pub recent_executions: Vec<PerAccountResult>,
    pub last_cycle: Option<CycleOutcome>,
    pub sources: Vec<&'static str>,
    pub channels: Vec<&'static str>,
    pub counters: CountersSnapshot,
}

/// Long-lived collaborators shared by every run
pub struct EngineDeps {
    pub aggregator: Arc<Aggregator>,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub refresher: Arc<BalanceRefresher>,
    pub classifier: Arc<TransferClassifier>,
    pub counters: Counters,
}

impl EngineDeps {
    /// Wire the production sources, venue and broadcast channels
    pub fn from_config(config: &Config, counters: Counters) -> Self {
        let rpc = Arc::new(SolanaRpc::new(config.rpc_url.clone(), config.rpc_timeout));
        let classifier = Arc::new(TransferClassifier::new(config.pool_addresses.iter().cloned()));
        let dexscreener = Arc::new(DexScreenerClient::new(config.source_timeout));

        let mut sources: Vec<Arc<dyn MarketDataSource>> = Vec::new();
        if let Some(key) = &config.birdeye_api_key {
            sources.push(Arc::new(BirdeyeSource::new(
                key.clone(),
                config.birdeye_polarity,
                config.source_timeout,
            )));
        }
        if let Some(key) = &config.helius_api_key {
            sources.push(Arc::new(HeliusSource::new(
                key.clone(),
                classifier.clone(),
                dexscreener.clone(),
                config.helius_polarity,
                config.source_timeout,
            )));
        }
        sources.push(Arc::new(DexScreenerSource::new(dexscreener, config.dexscreener_polarity)));

        let mut channels: Vec<Arc<dyn BroadcastChannel>> = Vec::new();
        if let Some(url) = &config.relay_url {
            channels.push(Arc::new(RelayChannel::new(
                url,
                config.relay_auth_token.clone(),
                rpc.clone(),
                config.relay_timeout,
            )));
        }
        channels.push(Arc::new(DirectChannel::new(rpc.clone(), config.direct_timeout)));

        let venue = Arc::new(JupiterClient::new(
            config.jupiter_url.clone(),
            config.priority_fee_lamports,
            config.source_timeout,
        ));
        let racer = Arc::new(BroadcastRacer::new(channels, counters.clone()));

        Self {
            aggregator: Arc::new(Aggregator::new(sources, config.source_timeout, counters.clone())),
            coordinator: Arc::new(ExecutionCoordinator::new(venue, racer)),
            refresher: Arc::new(BalanceRefresher::new(rpc, config.rpc_timeout)),
            classifier,
            counters,
        }
    }
}

/// State of one started run. Dropped on stop, taking keypairs and timers with it.
struct RunState {
    generation: u64,
    run_id: Uuid,
    config: EngineConfig,
    decimals: u8,
    accounts: Vec<Account>,
    window: TradeWindow,
    metrics: Metrics,
    executions: VecDeque<PerAccountResult>,
    last_cycle: Option<CycleOutcome>,
    started_at: DateTime<Utc>,
    timers: Scheduler,
}

impl RunState {
    /// Fold a polled sample into the window and metrics
    fn apply_sample(&mut self, sample: FlowSample, now: DateTime<Utc>) {
        // a newer poll replaces any earlier aggregate estimate
        self.window.drop_estimates();
        let (new_buy, new_sell) = self.window.extend(sample.observations);
        self.window.prune(now, self.config.window_seconds);

        match self.config.volume_mode {
            VolumeMode::Windowed => {
                let (buy, sell) = self.window.totals();
                self.metrics.set_volumes(buy, sell);
            }
            VolumeMode::Cumulative => {
                // trades already counted by an earlier poll or a webhook are skipped
                self.metrics.add_volumes(new_buy, new_sell);
            }
        }

        if let Some(price) = sample.price_usd.filter(|p| p.is_finite() && *p > 0.0) {
            self.metrics.current_price_usd = Some(price);
        }
        self.metrics.last_source = Some(sample.source.to_string());
        self.metrics.last_collected_at = Some(now);
    }

    /// Apply a finished batch to the cached balances, totals and execution log.
    /// Returns (confirmed, failed).
    fn apply_results(&mut self, results: &[PerAccountResult], price_usd: f64, now: DateTime<Utc>) -> (usize, usize) {
        let cooldown_until = now + ChronoDuration::seconds(self.config.cooldown_seconds as i64);
        let mut confirmed = 0;
        let mut sold_tokens = 0.0;

        for result in results {
            if result.is_confirmed() {
                confirmed += 1;
                sold_tokens += result.tokens_sent;
                if let Some(account) = self.accounts.iter_mut().find(|a| a.public_id() == result.account) {
                    account.token_balance = (account.token_balance - result.tokens_sent).max(0.0);
                    // any balance read issued before this point no longer applies
                    account.token_balance_as_of = Some(now);
                    if self.config.cooldown_scope == CooldownScope::PerAccount {
                        account.cooldown_until = Some(cooldown_until);
                    }
                }
            }
            self.executions.push_front(result.clone());
        }
        self.executions.truncate(EXECUTION_LOG_CAPACITY);

        self.metrics.total_sold_tokens += sold_tokens;
        self.metrics.total_sold_usd += sold_tokens * price_usd;
        (confirmed, results.len() - confirmed)
    }
}

struct Slot {
    phase: EnginePhase,
    run: Option<RunState>,
}

impl Slot {
    fn current(&self, generation: u64) -> Option<&RunState> {
        self.run.as_ref().filter(|r| r.generation == generation)
    }

    fn current_mut(&mut self, generation: u64) -> Option<&mut RunState> {
        self.run.as_mut().filter(|r| r.generation == generation)
    }
}

/// Everything `start` resolves before the engine flips to running
struct Prepared {
    config: EngineConfig,
    decimals: u8,
    accounts: Vec<Account>,
    rejected: usize,
}

pub struct Engine {
    deps: EngineDeps,
    generation: AtomicU64,
    state: RwLock<Slot>,
    /// Held by the in-flight analysis cycle so ticks never overlap
    cycle_guard: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(deps: EngineDeps) -> Arc<Self> {
        Arc::new(Self {
            deps,
            generation: AtomicU64::new(0),
            state: RwLock::new(Slot {
                phase: EnginePhase::Stopped,
                run: None,
            }),
            cycle_guard: Arc::new(Mutex::new(())),
        })
    }

    pub fn counters(&self) -> &Counters {
        &self.deps.counters
    }

    pub async fn phase(&self) -> EnginePhase {
        self.state.read().await.phase
    }

    pub async fn is_running(&self) -> bool {
        self.phase().await == EnginePhase::Running
    }

    /// Generation of the active run, if any
    pub async fn current_generation(&self) -> Option<u64> {
        self.state.read().await.run.as_ref().map(|r| r.generation)
    }

    /// Validate, decode credentials, load balances and begin the timers
    pub async fn start(self: &Arc<Self>, config: EngineConfig, credentials: Vec<String>) -> Result<StartSummary, EngineError> {
        {
            let mut slot = self.state.write().await;
            match slot.phase {
                EnginePhase::Running => return Err(EngineError::AlreadyRunning),
                EnginePhase::Starting | EnginePhase::Stopping => return Err(EngineError::Starting),
                EnginePhase::Stopped => slot.phase = EnginePhase::Starting,
            }
        }

        let prepared = match self.prepare(config, credentials).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.state.write().await.phase = EnginePhase::Stopped;
                warn!("[Engine] Start failed: {}", e);
                return Err(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let run_id = Uuid::new_v4();
        let timers = self.schedule(generation, &prepared.config);

        let summary = StartSummary {
            run_id,
            config: prepared.config.clone(),
            decimals: prepared.decimals,
            accounts: prepared.accounts.iter().map(Account::status).collect(),
            rejected_credentials: prepared.rejected,
        };

        let mut slot = self.state.write().await;
        slot.run = Some(RunState {
            generation,
            run_id,
            config: prepared.config,
            decimals: prepared.decimals,
            accounts: prepared.accounts,
            window: TradeWindow::new(),
            metrics: Metrics::default(),
            executions: VecDeque::new(),
            last_cycle: None,
            started_at: Utc::now(),
            timers,
        });
        slot.phase = EnginePhase::Running;

        info!(
            "[Engine] Started run {} for {} with {} accounts (window {}s, cooldown {}s)",
            run_id,
            summary.config.asset,
            summary.accounts.len(),
            summary.config.window_seconds,
            summary.config.cooldown_seconds
        );
        Ok(summary)
    }

    async fn prepare(&self, config: EngineConfig, credentials: Vec<String>) -> Result<Prepared, EngineError> {
        config.validate()?;
        if credentials.is_empty() {
            return Err(EngineError::MissingCredentials);
        }

        let decoded = decode_credentials(&credentials);
        for (index, reason) in &decoded.rejected {
            warn!("[Engine] Rejected credential #{}: {}", index, reason);
        }
        if decoded.keypairs.is_empty() {
            return Err(EngineError::NoValidCredentials {
                supplied: credentials.len(),
            });
        }

        let decimals = self.deps.refresher.decimals(&config.asset).await?;

        let mut accounts: Vec<Account> = decoded.keypairs.into_iter().map(Account::new).collect();
        let ids: Vec<String> = accounts.iter().map(Account::public_id).collect();
        let snapshots = self.deps.refresher.read(&ids, &config.asset).await;
        apply_snapshots(&mut accounts, &snapshots, Utc::now());

        Ok(Prepared {
            config,
            decimals,
            accounts,
            rejected: decoded.rejected.len(),
        })
    }

    fn schedule(self: &Arc<Self>, generation: u64, config: &EngineConfig) -> Scheduler {
        let mut timers = Scheduler::new(generation);

        let weak = Arc::downgrade(self);
        timers.every(
            "analysis",
            Duration::from_secs(config.window_seconds),
            false,
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(engine) = weak.upgrade() {
                        engine.on_analysis_tick(generation);
                    }
                }
            },
        );

        let weak: Weak<Engine> = Arc::downgrade(self);
        timers.every(
            "balances",
            Duration::from_secs(config.balance_refresh_seconds),
            false,
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(engine) = weak.upgrade() {
                        engine.refresh_balances(generation, None).await;
                    }
                }
            },
        );

        timers
    }

    /// Launch a cycle unless the previous one is still running
    fn on_analysis_tick(self: &Arc<Self>, generation: u64) {
        let guard = match self.cycle_guard.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.deps.counters.inc_cycles_skipped();
                debug!("[Engine] Previous cycle still running, skipping tick");
                return;
            }
        };

        let engine = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let cycle = tokio::spawn(async move { engine.run_cycle(generation).await });
            match cycle.await {
                Ok(outcome) => debug!("[Engine] Cycle finished: {:?}", outcome),
                Err(e) if e.is_panic() => error!("[Engine] Analysis cycle panicked: {}", e),
                Err(e) => warn!("[Engine] Analysis cycle aborted: {}", e),
            }
        });
    }

    /// One collect, analyze, execute pass for run `generation`
    pub async fn run_cycle(&self, generation: u64) -> CycleOutcome {
        let config = match self.state.read().await.current(generation) {
            Some(run) => run.config.clone(),
            None => return CycleOutcome::Superseded,
        };
        self.deps.counters.inc_cycles_run();

        let now = Utc::now();
        let collected = self
            .deps
            .aggregator
            .collect(&config.asset, config.window_seconds, now)
            .await;

        let (plan, ctx, price) = {
            let mut slot = self.state.write().await;
            let Some(run) = slot.current_mut(generation) else {
                return CycleOutcome::Superseded;
            };

            match collected {
                Ok(sample) => run.apply_sample(sample, now),
                Err(e) => {
                    run.metrics.reset_volumes();
                    self.deps.counters.inc_cycles_without_signal();
                    warn!("[Engine] No market signal this cycle: {}", e);
                    return record(run, CycleOutcome::NoSignal);
                }
            }

            debug!(
                "[Engine] Flow buy=${:.2} sell=${:.2} net=${:.2} ({} observations)",
                run.metrics.buy_volume_usd(),
                run.metrics.sell_volume_usd(),
                run.metrics.net_usd_flow(),
                run.window.len()
            );

            let target_usd = match analyzer::evaluate(&run.metrics, &run.config, run.metrics.last_sell_trigger_at, now) {
                TriggerDecision::Idle(reason) => return record(run, CycleOutcome::Idle(reason)),
                TriggerDecision::Sell { net_usd_flow, target_usd } => {
                    info!(
                        "[Engine] Net flow ${:.2} above threshold ${:.2}, targeting ${:.2}",
                        net_usd_flow,
                        run.config.threshold_usd(),
                        target_usd
                    );
                    target_usd
                }
            };

            let Some(price) = run.metrics.current_price_usd.filter(|p| *p > 0.0) else {
                warn!("[Engine] Trigger fired without a known price, skipping");
                return record(run, CycleOutcome::NoPrice);
            };

            let plan = plan_sell(target_usd, price, &run.accounts, &run.config, now);
            if plan.is_empty() {
                info!("[Engine] No eligible accounts for this trigger");
                return record(run, CycleOutcome::NoEligibleAccounts);
            }

            run.metrics.last_sell_trigger_at = Some(now);
            self.deps.counters.inc_triggers_fired();
            info!(
                "[Engine] Selling {:.4} tokens (${:.2}) across {} accounts",
                plan.total_to_sell,
                plan.total_to_sell * price,
                plan.sells.len()
            );

            let ctx = ExecutionContext {
                asset: run.config.asset.clone(),
                decimals: run.decimals,
                slippage_bps: run.config.slippage_bps,
            };
            (plan, ctx, price)
        };

        let results = self.deps.coordinator.run_plan(&plan, &ctx).await;

        let (outcome, sold_ids) = {
            let mut slot = self.state.write().await;
            let Some(run) = slot.current_mut(generation) else {
                info!("[Engine] Run ended during execution, discarding {} results", results.len());
                return CycleOutcome::Superseded;
            };
            let (confirmed, failed) = run.apply_results(&results, price, Utc::now());
            self.deps.counters.add_executions(confirmed as u64, failed as u64);
            info!("[Engine] Execution finished: {} confirmed, {} failed", confirmed, failed);

            let sold_ids: Vec<String> = results
                .iter()
                .filter(|r| r.is_confirmed())
                .map(|r| r.account.clone())
                .collect();
            (record(run, CycleOutcome::Executed { confirmed, failed }), sold_ids)
        };

        if !sold_ids.is_empty() {
            self.refresh_balances(generation, Some(sold_ids)).await;
        }
        outcome
    }

    /// Re-read balances for all accounts, or only `only`
    pub async fn refresh_balances(&self, generation: u64, only: Option<Vec<String>>) -> usize {
        let (ids, mint) = {
            let slot = self.state.read().await;
            let Some(run) = slot.current(generation) else {
                return 0;
            };
            let ids = match only {
                Some(ids) => ids,
                None => run.accounts.iter().map(Account::public_id).collect(),
            };
            (ids, run.config.asset.clone())
        };

        let snapshots = self.deps.refresher.read(&ids, &mint).await;

        let mut slot = self.state.write().await;
        match slot.current_mut(generation) {
            Some(run) => apply_snapshots(&mut run.accounts, &snapshots, Utc::now()),
            None => 0,
        }
    }

    /// Fold pushed transactions into the trade window
    pub async fn ingest_pushed(&self, transactions: &[EnhancedTransaction]) -> IngestSummary {
        let now = Utc::now();
        let mut summary = IngestSummary::default();

        let mut slot = self.state.write().await;
        let running = slot.phase == EnginePhase::Running;
        let run = match slot.run.as_mut() {
            Some(run) if running => run,
            _ => {
                summary.ignored = transactions.len();
                self.deps.counters.add_webhook_events(0, summary.ignored as u64);
                return summary;
            }
        };

        let quiet_until = run.started_at + ChronoDuration::seconds(run.config.quiet_period_seconds as i64);
        let price = run.metrics.current_price_usd.filter(|p| *p > 0.0);
        let Some(price) = price.filter(|_| now >= quiet_until) else {
            debug!("[Webhook] Ignoring {} events (quiet period or no price yet)", transactions.len());
            summary.ignored = transactions.len();
            self.deps.counters.add_webhook_events(0, summary.ignored as u64);
            return summary;
        };

        let window_seconds = run.config.window_seconds;
        for tx in transactions {
            let accepted = self
                .deps
                .classifier
                .classify(tx, &run.config.asset)
                .filter(|t| in_window(t.timestamp, window_seconds, now))
                .map(|t| {
                    let usd = t.tokens * price;
                    let side = t.side;
                    (run.window.insert(TradeObservation::pushed(side, usd, t.timestamp, t.signature)), side, usd)
                });

            match accepted {
                Some((true, side, usd)) => {
                    summary.accepted += 1;
                    if run.config.volume_mode == VolumeMode::Cumulative {
                        match side {
                            Side::Buy => run.metrics.add_volumes(usd, 0.0),
                            Side::Sell => run.metrics.add_volumes(0.0, usd),
                        }
                    }
                }
                _ => summary.ignored += 1,
            }
        }

        if summary.accepted > 0 && run.config.volume_mode == VolumeMode::Windowed {
            run.window.prune(now, window_seconds);
            let (buy, sell) = run.window.totals();
            run.metrics.set_volumes(buy, sell);
        }

        self.deps
            .counters
            .add_webhook_events(summary.accepted as u64, summary.ignored as u64);
        debug!("[Webhook] Accepted {}, ignored {}", summary.accepted, summary.ignored);
        summary
    }

    /// Halt the timers and drop the run. In-flight work finishes on its own
    /// and its results are discarded.
    pub async fn stop(&self) -> Result<StopSummary, EngineError> {
        let mut slot = self.state.write().await;
        if slot.phase != EnginePhase::Running {
            return Err(EngineError::NotRunning);
        }
        slot.phase = EnginePhase::Stopping;

        let run = slot.run.take();
        slot.phase = EnginePhase::Stopped;
        drop(slot);

        let Some(mut run) = run else {
            return Err(EngineError::NotRunning);
        };
        run.timers.cancel_all();

        let summary = StopSummary {
            run_id: run.run_id,
            ran_for_seconds: (Utc::now() - run.started_at).num_seconds(),
            total_sold_tokens: run.metrics.total_sold_tokens,
            total_sold_usd: run.metrics.total_sold_usd,
        };
        info!(
            "[Engine] Stopped run {} after {}s (sold {:.4} tokens, ${:.2})",
            summary.run_id, summary.ran_for_seconds, summary.total_sold_tokens, summary.total_sold_usd
        );
        Ok(summary)
    }

    pub async fn status(&self) -> EngineStatus {
        let counters = self.deps.counters.snapshot().await;
        let sources = self.deps.aggregator.source_names();
        let channels = self.deps.coordinator.channel_names();

        let slot = self.state.read().await;
        match &slot.run {
            Some(run) => EngineStatus {
                running: slot.phase == EnginePhase::Running,
                phase: slot.phase,
                run_id: Some(run.run_id),
                started_at: Some(run.started_at),
                config: Some(run.config.clone()),
                metrics: Some(run.metrics.clone()),
                recent_trade_window: run.window.recent(STATUS_WINDOW_LIMIT),
                per_account_status: run.accounts.iter().map(Account::status).collect(),
                recent_executions: run.executions.iter().cloned().collect(),
                last_cycle: run.last_cycle.clone(),
                sources,
                channels,
                counters,
            },
            None => EngineStatus {
                running: false,
                phase: slot.phase,
                run_id: None,
                started_at: None,
                config: None,
                metrics: None,
                recent_trade_window: Vec::new(),
                per_account_status: Vec::new(),
                recent_executions: Vec::new(),
                last_cycle: None,
                sources,
                channels,
                counters,
            },
        }
    }
}

fn record(run: &mut RunState, outcome: CycleOutcome) -> CycleOutcome {
    run.last_cycle = Some(outcome.clone());
    outcome
}
