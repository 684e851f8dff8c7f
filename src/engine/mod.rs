//! Auto-sell engine: flow analysis, sizing, execution and lifecycle

pub mod analyzer;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod refresher;
pub mod scheduler;
pub mod window;

pub use analyzer::{evaluate, CooldownGate, IdleReason, TriggerDecision};
pub use config::{CooldownScope, EngineConfig, EngineConfigRequest, VolumeMode};
pub use controller::{
    CycleOutcome, Engine, EngineDeps, EnginePhase, EngineStatus, IngestSummary, StartSummary, StopSummary,
};
pub use coordinator::{plan_sell, ExecutionContext, ExecutionCoordinator, PlannedSell, SellPlan};
pub use refresher::{apply_snapshots, BalanceRefresher, BalanceSnapshot};
pub use scheduler::Scheduler;
pub use window::TradeWindow;
