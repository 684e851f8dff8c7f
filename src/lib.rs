//! Flow Seller Library
//!
//! Watches on-chain buy/sell flow for one SPL token and, when buyers
//! outweigh sellers, sells a slice of the position across a pool of
//! independently signing accounts.
//!
//! Each cycle pulls flow from a waterfall of market data sources, compares
//! net USD flow against a threshold, sizes the sell pro rata over the
//! eligible accounts and races every signed swap across broadcast channels.

pub mod api;
pub mod chain;
pub mod config;
pub mod engine;
pub mod errors;
pub mod execution;
pub mod services;
pub mod sources;
pub mod types;
pub mod wallet;

pub use config::Config;
pub use engine::{Engine, EngineConfig, EngineDeps, EngineStatus};
pub use errors::EngineError;
pub use types::{Metrics, PerAccountResult, Side, TradeObservation};
