use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::config::RegimeSettings;
use crate::indicators::IndicatorSnapshot;
use crate::types::{RegimeKind, RegimeState, TradingPair};

/// Hysteretic regime selector. ADX below `adx_low` reads as ranging
/// (mean-reversion), above `adx_high` as trending (trend-following); the gap
/// between the two thresholds is the hysteresis band that stops a symbol
/// sitting right at the boundary from flapping every candle.
///
/// A regime change away from an already-committed MR/TF mode only commits
/// once `min_dwell_minutes` has elapsed since that mode was entered —
/// otherwise the previous mode is held. Leaving TRANSITION is never gated:
/// a symbol that hasn't settled into a mode yet commits to the first clear
/// reading.
#[derive(Debug, Clone)]
pub struct RegimeSelector {
    state: RegimeState,
}

impl RegimeSelector {
    pub fn new(symbol: TradingPair) -> Self {
        Self {
            state: RegimeState {
                symbol,
                current_regime: RegimeKind::Transition,
                entered_regime_at: Utc::now(),
                candles_in_regime: 0,
            },
        }
    }

    pub fn from_state(state: RegimeState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &RegimeState {
        &self.state
    }

    /// Reads the ADX value and advances the dwell-guarded state machine,
    /// returning the regime now in effect for this candle. `now` is the
    /// candle's own timestamp, not wall-clock time, so replays and tests
    /// drive the dwell guard deterministically.
    pub fn update(&mut self, snapshot: &IndicatorSnapshot, settings: &RegimeSettings, now: DateTime<Utc>) -> RegimeKind {
        let candidate = Self::classify(snapshot.adx, settings);

        if candidate == self.state.current_regime {
            self.state.candles_in_regime += 1;
            return self.state.current_regime;
        }

        let dwell_elapsed = now - self.state.entered_regime_at >= Duration::minutes(settings.min_dwell_minutes);
        let leaving_transition = self.state.current_regime == RegimeKind::Transition;

        if !dwell_elapsed && !leaving_transition {
            return self.state.current_regime;
        }

        self.state.current_regime = candidate;
        self.state.entered_regime_at = now;
        self.state.candles_in_regime = 1;
        candidate
    }

    fn classify(adx: Decimal, settings: &RegimeSettings) -> RegimeKind {
        if adx < settings.adx_low {
            RegimeKind::MeanReversion
        } else if adx > settings.adx_high {
            RegimeKind::TrendFollowing
        } else {
            RegimeKind::Transition
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot_with_adx(adx: Decimal) -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: dec!(100),
            ema_fast: dec!(100),
            ema_slow: dec!(100),
            ema_trend: dec!(100),
            ema_trend_slope_pct: Some(Decimal::ZERO),
            rsi: dec!(50),
            macd_line: Decimal::ZERO,
            macd_signal: Decimal::ZERO,
            macd_histogram: Decimal::ZERO,
            adx,
            plus_di: dec!(20),
            minus_di: dec!(20),
            atr: dec!(1),
            atr_pct: dec!(1),
            bb_upper: dec!(101),
            bb_middle: dec!(100),
            bb_lower: dec!(99),
            bb_percent_b: dec!(0.5),
            zscore: Decimal::ZERO,
            volume: dec!(100),
            avg_volume: dec!(100),
            relative_volume: dec!(1),
            nday_low: dec!(90),
        }
    }

    fn base_time() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn leaving_transition_commits_immediately_on_the_first_clear_reading() {
        let mut selector = RegimeSelector::new(TradingPair::BTCUSDT);
        let settings = RegimeSettings::default();
        let result = selector.update(&snapshot_with_adx(dec!(30)), &settings, base_time());
        assert_eq!(result, RegimeKind::TrendFollowing);
        assert_eq!(selector.state().current_regime, RegimeKind::TrendFollowing);
    }

    #[test]
    fn leaving_a_committed_mode_before_dwell_elapses_holds_the_old_mode() {
        let state = RegimeState {
            symbol: TradingPair::BTCUSDT,
            current_regime: RegimeKind::TrendFollowing,
            entered_regime_at: base_time(),
            candles_in_regime: 5,
        };
        let mut selector = RegimeSelector::from_state(state);
        let settings = RegimeSettings::default(); // min_dwell_minutes = 30

        let result = selector.update(&snapshot_with_adx(dec!(15)), &settings, base_time() + Duration::minutes(10));
        assert_eq!(result, RegimeKind::TrendFollowing);
        assert_eq!(selector.state().current_regime, RegimeKind::TrendFollowing);
    }

    #[test]
    fn leaving_a_committed_mode_after_dwell_elapses_commits_the_new_mode() {
        let state = RegimeState {
            symbol: TradingPair::BTCUSDT,
            current_regime: RegimeKind::TrendFollowing,
            entered_regime_at: base_time(),
            candles_in_regime: 5,
        };
        let mut selector = RegimeSelector::from_state(state);
        let settings = RegimeSettings::default(); // min_dwell_minutes = 30

        let result = selector.update(&snapshot_with_adx(dec!(15)), &settings, base_time() + Duration::minutes(31));
        assert_eq!(result, RegimeKind::MeanReversion);
        assert_eq!(selector.state().current_regime, RegimeKind::MeanReversion);
    }
}
