//! Per-run engine configuration
//!
//! Supplied with each start request and fixed for the lifetime of the run.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Whether the cooldown gates the whole pool or each account separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CooldownScope {
    #[default]
    Global,
    PerAccount,
}

/// How buy/sell volumes evolve between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeMode {
    /// Recomputed from the trade window each cycle
    #[default]
    Windowed,
    /// Running totals since start
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Mint address of the monitored asset
    pub asset: String,
    pub window_seconds: u64,
    /// Net flow must exceed this; `None` means any positive flow
    pub min_net_flow_usd: Option<f64>,
    pub sell_fraction: f64,
    pub cooldown_seconds: u64,
    pub slippage_bps: u16,
    /// Ceiling on one batch, as a fraction of total tokens held
    pub max_sell_fraction: f64,
    /// Floor on one batch, as a fraction of total tokens held
    pub min_sell_fraction: f64,
    /// Accounts holding no more than this are skipped
    pub dust_floor: f64,
    pub cooldown_scope: CooldownScope,
    pub volume_mode: VolumeMode,
    /// Webhook events are ignored for this long after start
    pub quiet_period_seconds: u64,
    pub balance_refresh_seconds: u64,
}

impl EngineConfig {
    pub const DEFAULT_WINDOW_SECONDS: u64 = 30;
    pub const DEFAULT_SELL_FRACTION: f64 = 0.25;
    pub const DEFAULT_COOLDOWN_SECONDS: u64 = 60;
    pub const DEFAULT_SLIPPAGE_BPS: u16 = 100;
    pub const DEFAULT_MAX_SELL_FRACTION: f64 = 0.25;
    pub const DEFAULT_MIN_SELL_FRACTION: f64 = 0.001;
    pub const DEFAULT_DUST_FLOOR: f64 = 1.0;
    /// Upper bound on every duration field
    pub const MAX_DURATION_SECONDS: u64 = 86_400;

    /// Config for `asset` with every other field at its default
    pub fn for_asset(asset: impl Into<String>, balance_refresh_seconds: u64) -> Self {
        Self {
            asset: asset.into(),
            window_seconds: Self::DEFAULT_WINDOW_SECONDS,
            min_net_flow_usd: None,
            sell_fraction: Self::DEFAULT_SELL_FRACTION,
            cooldown_seconds: Self::DEFAULT_COOLDOWN_SECONDS,
            slippage_bps: Self::DEFAULT_SLIPPAGE_BPS,
            max_sell_fraction: Self::DEFAULT_MAX_SELL_FRACTION,
            min_sell_fraction: Self::DEFAULT_MIN_SELL_FRACTION,
            dust_floor: Self::DEFAULT_DUST_FLOOR,
            cooldown_scope: CooldownScope::Global,
            volume_mode: VolumeMode::Windowed,
            quiet_period_seconds: 0,
            balance_refresh_seconds,
        }
    }

    /// Trigger threshold in USD
    pub fn threshold_usd(&self) -> f64 {
        self.min_net_flow_usd.unwrap_or(0.0)
    }

    /// Parsed mint of the asset
    pub fn mint(&self) -> Result<Pubkey, ConfigError> {
        Pubkey::from_str(&self.asset)
            .map_err(|_| ConfigError::invalid("asset", format!("'{}' is not a valid mint address", self.asset)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset.trim().is_empty() {
            return Err(ConfigError::Missing("asset"));
        }
        self.mint()?;

        for (field, value) in [
            ("windowSeconds", self.window_seconds),
            ("cooldownSeconds", self.cooldown_seconds),
            ("balanceRefreshSeconds", self.balance_refresh_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
            if value > Self::MAX_DURATION_SECONDS {
                return Err(ConfigError::invalid(
                    field,
                    format!("must not exceed {} seconds", Self::MAX_DURATION_SECONDS),
                ));
            }
        }

        if self.quiet_period_seconds > Self::MAX_DURATION_SECONDS {
            return Err(ConfigError::invalid(
                "quietPeriodSeconds",
                format!("must not exceed {} seconds", Self::MAX_DURATION_SECONDS),
            ));
        }

        for (field, value) in [
            ("sellFraction", self.sell_fraction),
            ("maxSellFraction", self.max_sell_fraction),
            ("minSellFraction", self.min_sell_fraction),
        ] {
            if !(value.is_finite() && value > 0.0 && value <= 1.0) {
                return Err(ConfigError::invalid(field, "must be in (0, 1]"));
            }
        }

        if self.min_sell_fraction > self.max_sell_fraction {
            return Err(ConfigError::invalid(
                "minSellFraction",
                "must not exceed maxSellFraction",
            ));
        }

        if !(1..=10_000).contains(&self.slippage_bps) {
            return Err(ConfigError::invalid("slippageBps", "must be between 1 and 10000"));
        }

        if let Some(threshold) = self.min_net_flow_usd {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::invalid("minNetFlowUsd", "must be a non-negative number"));
            }
        }

        if !self.dust_floor.is_finite() || self.dust_floor < 0.0 {
            return Err(ConfigError::invalid("dustFloor", "must be a non-negative number"));
        }

        Ok(())
    }
}

/// Engine config as it arrives over the API, every field optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfigRequest {
    pub asset: Option<String>,
    pub window_seconds: Option<u64>,
    pub min_net_flow_usd: Option<f64>,
    pub sell_fraction: Option<f64>,
    pub cooldown_seconds: Option<u64>,
    pub slippage_bps: Option<u16>,
    pub max_sell_fraction: Option<f64>,
    pub min_sell_fraction: Option<f64>,
    pub dust_floor: Option<f64>,
    pub cooldown_scope: Option<CooldownScope>,
    pub volume_mode: Option<VolumeMode>,
    pub quiet_period_seconds: Option<u64>,
    pub balance_refresh_seconds: Option<u64>,
}

impl EngineConfigRequest {
    /// Fill defaults and validate
    pub fn into_config(self, default_balance_refresh_seconds: u64) -> Result<EngineConfig, ConfigError> {
        let asset = self
            .asset
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or(ConfigError::Missing("asset"))?;

        let defaults = EngineConfig::for_asset(
            asset,
            self.balance_refresh_seconds.unwrap_or(default_balance_refresh_seconds),
        );

        let config = EngineConfig {
            window_seconds: self.window_seconds.unwrap_or(defaults.window_seconds),
            min_net_flow_usd: self.min_net_flow_usd,
            sell_fraction: self.sell_fraction.unwrap_or(defaults.sell_fraction),
            cooldown_seconds: self.cooldown_seconds.unwrap_or(defaults.cooldown_seconds),
            slippage_bps: self.slippage_bps.unwrap_or(defaults.slippage_bps),
            max_sell_fraction: self.max_sell_fraction.unwrap_or(defaults.max_sell_fraction),
            min_sell_fraction: self.min_sell_fraction.unwrap_or(defaults.min_sell_fraction),
            dust_floor: self.dust_floor.unwrap_or(defaults.dust_floor),
            cooldown_scope: self.cooldown_scope.unwrap_or(defaults.cooldown_scope),
            volume_mode: self.volume_mode.unwrap_or(defaults.volume_mode),
            quiet_period_seconds: self.quiet_period_seconds.unwrap_or(defaults.quiet_period_seconds),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[test]
    fn test_defaults_fill_in() {
        let request: EngineConfigRequest = serde_json::from_str(&format!(r#"{{"asset":"{}"}}"#, MINT)).unwrap();
        let config = request.into_config(30).unwrap();

        assert_eq!(config.window_seconds, 30);
        assert_eq!(config.sell_fraction, 0.25);
        assert_eq!(config.cooldown_seconds, 60);
        assert_eq!(config.slippage_bps, 100);
        assert_eq!(config.threshold_usd(), 0.0);
        assert_eq!(config.cooldown_scope, CooldownScope::Global);
        assert_eq!(config.volume_mode, VolumeMode::Windowed);
        assert_eq!(config.balance_refresh_seconds, 30);
    }

    #[test]
    fn test_policy_flags_parse() {
        let request: EngineConfigRequest = serde_json::from_str(&format!(
            r#"{{"asset":"{}","cooldownScope":"perAccount","volumeMode":"cumulative","minNetFlowUsd":50}}"#,
            MINT
        ))
        .unwrap();
        let config = request.into_config(30).unwrap();
        assert_eq!(config.cooldown_scope, CooldownScope::PerAccount);
        assert_eq!(config.volume_mode, VolumeMode::Cumulative);
        assert_eq!(config.threshold_usd(), 50.0);
    }

    #[test]
    fn test_missing_asset() {
        assert_eq!(
            EngineConfigRequest::default().into_config(30),
            Err(ConfigError::Missing("asset"))
        );
        let blank = EngineConfigRequest {
            asset: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.into_config(30), Err(ConfigError::Missing("asset")));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let base = || EngineConfigRequest {
            asset: Some(MINT.to_string()),
            ..Default::default()
        };

        let cases = [
            EngineConfigRequest { window_seconds: Some(0), ..base() },
            EngineConfigRequest { cooldown_seconds: Some(0), ..base() },
            EngineConfigRequest { window_seconds: Some(10_000_000_000_000_000), ..base() },
            EngineConfigRequest { cooldown_seconds: Some(10_000_000_000_000_000), ..base() },
            EngineConfigRequest { quiet_period_seconds: Some(10_000_000_000_000_000), ..base() },
            EngineConfigRequest { balance_refresh_seconds: Some(u64::MAX), ..base() },
            EngineConfigRequest { sell_fraction: Some(0.0), ..base() },
            EngineConfigRequest { sell_fraction: Some(1.5), ..base() },
            EngineConfigRequest { slippage_bps: Some(0), ..base() },
            EngineConfigRequest { slippage_bps: Some(10_001), ..base() },
            EngineConfigRequest { min_sell_fraction: Some(0.5), max_sell_fraction: Some(0.2), ..base() },
            EngineConfigRequest { min_net_flow_usd: Some(-1.0), ..base() },
            EngineConfigRequest { asset: Some("not-a-mint".to_string()), ..base() },
        ];

        for case in cases {
            assert!(case.clone().into_config(30).is_err(), "accepted {:?}", case);
        }

        assert!(EngineConfigRequest { sell_fraction: Some(1.0), ..base() }.into_config(30).is_ok());
        assert!(EngineConfigRequest {
            window_seconds: Some(EngineConfig::MAX_DURATION_SECONDS),
            cooldown_seconds: Some(EngineConfig::MAX_DURATION_SECONDS),
            quiet_period_seconds: Some(EngineConfig::MAX_DURATION_SECONDS),
            ..base()
        }
        .into_config(30)
        .is_ok());
    }
}
