use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Full set of tunables for the signal-and-portfolio engine. Every named
/// option referenced by the vote aggregator, regime selector, signal
/// generator, sizer and position manager lives here so a single
/// `RuntimeConfigManager::update_full` call can re-point the whole engine at
/// a new configuration atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub votes: VoteSettings,
    pub regime: RegimeSettings,
    pub entry: EntrySettings,
    pub exits: ExitSettings,
    pub averaging: AveragingSettings,
    pub sizing: SizingSettings,
    pub risk: RiskSettings,
    pub general: GeneralSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            votes: VoteSettings::default(),
            regime: RegimeSettings::default(),
            entry: EntrySettings::default(),
            exits: ExitSettings::default(),
            averaging: AveragingSettings::default(),
            sizing: SizingSettings::default(),
            risk: RiskSettings::default(),
            general: GeneralSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads defaults, layers an optional TOML file over them, then layers
    /// `ENGINE__`-prefixed environment variables over that (`ENGINE__SIZING__KELLY_FRACTION=0.3`
    /// addresses `sizing.kelly_fraction`). `.env` is read first via `dotenvy`
    /// so a local override file doesn't require exporting vars into the
    /// shell. The file is optional — a fresh checkout with no config file
    /// and no env overrides still starts, using `Default::default()`.
    pub fn load(path: Option<&str>) -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let defaults_toml = toml::to_string(&defaults)
            .map_err(|e| EngineError::Configuration(format!("failed to serialize config defaults: {e}")))?;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(&defaults_toml, config::FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ENGINE").separator("__").try_parsing(true),
        );

        let settled = builder
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to assemble configuration: {e}")))?;

        settled
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(format!("failed to parse configuration: {e}")))
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.votes.min_votes_for_buy <= 0 {
            errors.push("votes.min_votes_for_buy must be > 0".to_string());
        }
        if self.votes.min_votes_for_sell <= 0 {
            errors.push("votes.min_votes_for_sell must be > 0".to_string());
        }
        if self.votes.transition_min_votes_for_buy < self.votes.min_votes_for_buy {
            errors.push("votes.transition_min_votes_for_buy must be >= votes.min_votes_for_buy".to_string());
        }

        if self.regime.adx_low >= self.regime.adx_high {
            errors.push("regime.adx_low must be < regime.adx_high".to_string());
        }
        if self.regime.min_dwell_minutes <= 0 {
            errors.push("regime.min_dwell_minutes must be > 0".to_string());
        }

        if self.entry.tf_ema_fast_period >= self.entry.tf_ema_slow_period {
            errors.push("entry.tf_ema_fast_period must be < entry.tf_ema_slow_period".to_string());
        }
        if self.entry.mr_rsi_oversold >= self.entry.mr_rsi_overbought {
            errors.push("entry.mr_rsi_oversold must be < entry.mr_rsi_overbought".to_string());
        }
        if self.entry.volume_spike_mult <= Decimal::ZERO {
            errors.push("entry.volume_spike_mult must be > 0".to_string());
        }
        if self.entry.mr_stop_loss_pct <= Decimal::ZERO || self.entry.tf_stop_loss_pct <= Decimal::ZERO {
            errors.push("entry stop-loss templates must be > 0".to_string());
        }
        if self.entry.mr_adx_max <= Decimal::ZERO {
            errors.push("entry.mr_adx_max must be > 0".to_string());
        }

        if self.exits.partial_tp_close_fraction <= Decimal::ZERO || self.exits.partial_tp_close_fraction >= Decimal::ONE {
            errors.push("exits.partial_tp_close_fraction must be between 0 and 1".to_string());
        }
        if self.exits.trail_distance_pct <= Decimal::ZERO {
            errors.push("exits.trail_distance_pct must be > 0".to_string());
        }

        if self.averaging.max_averaging_attempts == 0 {
            errors.push("averaging.max_averaging_attempts must be > 0".to_string());
        }
        if self.averaging.max_total_risk_multiplier < Decimal::ONE {
            errors.push("averaging.max_total_risk_multiplier must be >= 1".to_string());
        }

        if self.sizing.kelly_fraction <= Decimal::ZERO || self.sizing.kelly_fraction > Decimal::ONE {
            errors.push("sizing.kelly_fraction must be between 0 and 1".to_string());
        }
        if self.sizing.size_min_pct > self.sizing.size_max_pct {
            errors.push("sizing.size_min_pct must be <= sizing.size_max_pct".to_string());
        }

        if self.risk.max_positions == 0 {
            errors.push("risk.max_positions must be > 0".to_string());
        }
        if self.risk.commission_rate < Decimal::ZERO {
            errors.push("risk.commission_rate must be >= 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Thresholds the vote aggregator and signal generator use to turn a raw
/// vote count into a BUY/SELL/HOLD decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSettings {
    pub min_votes_for_buy: i32,
    pub min_votes_for_sell: i32,
    /// Higher bar applied while the regime selector reports TRANSITION,
    /// since conviction is lower mid-switch.
    pub transition_min_votes_for_buy: i32,
}

impl Default for VoteSettings {
    fn default() -> Self {
        Self {
            min_votes_for_buy: 3,
            min_votes_for_sell: 3,
            transition_min_votes_for_buy: 5,
        }
    }
}

/// Hysteresis thresholds for the MR / TF / TRANSITION regime selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSettings {
    pub adx_low: Decimal,
    pub adx_high: Decimal,
    /// Minimum wall-clock time a committed MR/TF mode must hold before the
    /// selector allows leaving it for a new reading. Never gates leaving
    /// TRANSITION, only a mode already settled into.
    pub min_dwell_minutes: i64,
}

impl Default for RegimeSettings {
    fn default() -> Self {
        Self {
            adx_low: dec!(20),
            adx_high: dec!(25),
            min_dwell_minutes: 30,
        }
    }
}

/// Entry-filter parameters, split by regime template plus the shared
/// no-buy / volume-spike / trend-decay guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySettings {
    pub mr_rsi_oversold: Decimal,
    pub mr_rsi_overbought: Decimal,
    pub mr_zscore_threshold: Decimal,
    /// Mean-reversion entries also require ADX below this ceiling — a
    /// ranging-looking z-score doesn't qualify if the trend strength has
    /// already picked up underneath it.
    pub mr_adx_max: Decimal,
    pub tf_ema_fast_period: usize,
    pub tf_ema_slow_period: usize,
    pub tf_adx_min: Decimal,
    /// No-buy filter: skip entries within this percent of the trailing
    /// N-day low, to avoid catching a falling knife.
    pub no_buy_below_pct: Decimal,
    pub volume_spike_mult: Decimal,
    pub ema200_neg_slope_threshold: Decimal,
    /// Initial stop-loss distance for a mean-reversion entry, as a percent
    /// of entry price. The position manager uses `max(mr_stop_loss_pct,
    /// atr_pct * mr_atr_sl_mult)` so a volatile entry gets a wider stop.
    pub mr_stop_loss_pct: Decimal,
    pub mr_take_profit_pct: Decimal,
    pub mr_atr_sl_mult: Decimal,
    pub mr_atr_tp_mult: Decimal,
    /// Trend-following entries run wider templates than mean-reversion ones
    /// since they're meant to ride a move rather than fade it.
    pub tf_stop_loss_pct: Decimal,
    pub tf_take_profit_pct: Decimal,
}

impl Default for EntrySettings {
    fn default() -> Self {
        Self {
            mr_rsi_oversold: dec!(30),
            mr_rsi_overbought: dec!(70),
            mr_zscore_threshold: dec!(2.0),
            mr_adx_max: dec!(35),
            tf_ema_fast_period: 9,
            tf_ema_slow_period: 21,
            tf_adx_min: dec!(25),
            no_buy_below_pct: dec!(1.0),
            volume_spike_mult: dec!(2.0),
            ema200_neg_slope_threshold: dec!(0.5),
            mr_stop_loss_pct: dec!(3.0),
            mr_take_profit_pct: dec!(4.0),
            mr_atr_sl_mult: dec!(1.5),
            mr_atr_tp_mult: dec!(2.0),
            tf_stop_loss_pct: dec!(5.0),
            tf_take_profit_pct: dec!(10.0),
        }
    }
}

/// Exit templates shared by both regimes: trailing stop activation/distance
/// and the one-shot partial take-profit. Breakeven itself has no separate
/// trigger — it promotes automatically whenever the partial take-profit
/// fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSettings {
    pub trail_activation_pct: Decimal,
    pub trail_distance_pct: Decimal,
    pub partial_tp_trigger_pct: Decimal,
    pub partial_tp_close_fraction: Decimal,
}

impl Default for ExitSettings {
    fn default() -> Self {
        Self {
            trail_activation_pct: dec!(2.0),
            trail_distance_pct: dec!(1.2),
            partial_tp_trigger_pct: dec!(3.0),
            partial_tp_close_fraction: dec!(0.5),
        }
    }
}

/// AVERAGE_DOWN (mean-reversion regime) and PYRAMID_UP (trend regime)
/// parameters, plus the shared attempt and exposure caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AveragingSettings {
    pub average_down_trigger_pct: Decimal,
    pub average_down_size_fraction: Decimal,
    pub pyramid_up_trigger_pct: Decimal,
    pub pyramid_up_size_fraction: Decimal,
    pub max_averaging_attempts: u32,
    pub max_total_risk_multiplier: Decimal,
}

impl Default for AveragingSettings {
    fn default() -> Self {
        Self {
            average_down_trigger_pct: dec!(3.0),
            average_down_size_fraction: dec!(0.5),
            pyramid_up_trigger_pct: dec!(2.0),
            pyramid_up_size_fraction: dec!(0.5),
            max_averaging_attempts: 2,
            max_total_risk_multiplier: dec!(2.0),
        }
    }
}

/// Position sizer parameters, including the Kelly-criterion inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingSettings {
    pub use_kelly: bool,
    pub kelly_fraction: Decimal,
    pub kelly_lookback_trades: usize,
    pub size_min_pct: Decimal,
    pub size_max_pct: Decimal,
}

impl Default for SizingSettings {
    fn default() -> Self {
        Self {
            use_kelly: true,
            kelly_fraction: dec!(0.5),
            kelly_lookback_trades: 30,
            size_min_pct: dec!(2.0),
            size_max_pct: dec!(20.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    pub max_positions: usize,
    pub commission_rate: Decimal,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_positions: 5,
            commission_rate: dec!(0.001),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub enabled_pairs: Vec<String>,
    pub timeframe: String,
    /// Identifier of the chat user allowed to issue control commands.
    /// Any command arriving from a different identifier is refused before
    /// it touches the ledger.
    pub owner_id: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            enabled_pairs: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            timeframe: "H1".to_string(),
            owner_id: "owner".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn transition_threshold_below_base_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.votes.transition_min_votes_for_buy = cfg.votes.min_votes_for_buy - 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_dwell_minutes_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.regime.min_dwell_minutes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_with_no_file_and_no_overrides_matches_defaults() {
        let loaded = RuntimeConfig::load(None).unwrap();
        assert_eq!(loaded.votes.min_votes_for_buy, RuntimeConfig::default().votes.min_votes_for_buy);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn load_ignores_a_missing_override_file() {
        let loaded = RuntimeConfig::load(Some("does-not-exist-anywhere.toml")).unwrap();
        assert!(loaded.validate().is_ok());
    }
}
