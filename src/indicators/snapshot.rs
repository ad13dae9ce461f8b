use rust_decimal::Decimal;

use super::{
    adx::ADX, atr::ATR, bollinger::BollingerBands, ema::EMA, macd::MACD, nday_low::NDayLow,
    rsi::RSI, volume::VolumeProfile, zscore::ZScore, Indicator,
};
use crate::types::Candle;

/// Incremental indicator stack for a single symbol. Owns one instance of
/// each indicator and folds in one closed candle at a time, emitting an
/// immutable [`IndicatorSnapshot`] once every indicator has enough history
/// to produce a value.
#[derive(Debug, Clone)]
pub struct SymbolIndicators {
    ema_fast: EMA,
    ema_slow: EMA,
    ema_trend: EMA,
    prev_ema_trend: Option<Decimal>,
    rsi: RSI,
    macd: MACD,
    adx: ADX,
    atr: ATR,
    bollinger: BollingerBands,
    zscore: ZScore,
    volume: VolumeProfile,
    nday_low: NDayLow,
    last_snapshot: Option<IndicatorSnapshot>,
}

/// Period configuration for a [`SymbolIndicators`] stack, pulled from
/// `RuntimeConfig` so backtests and live runs share one construction path.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorPeriods {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub rsi: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub adx: usize,
    pub atr: usize,
    pub bollinger: usize,
    pub bollinger_stddev: Decimal,
    pub zscore: usize,
    pub volume: usize,
    pub nday_low: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            ema_trend: 200,
            rsi: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            adx: 14,
            atr: 14,
            bollinger: 20,
            bollinger_stddev: Decimal::from(2),
            zscore: 20,
            volume: 20,
            nday_low: 20,
        }
    }
}

impl SymbolIndicators {
    pub fn new(periods: IndicatorPeriods) -> Self {
        Self {
            ema_fast: EMA::new(periods.ema_fast),
            ema_slow: EMA::new(periods.ema_slow),
            ema_trend: EMA::new(periods.ema_trend),
            prev_ema_trend: None,
            rsi: RSI::new(periods.rsi),
            macd: MACD::new(periods.macd_fast, periods.macd_slow, periods.macd_signal),
            adx: ADX::new(periods.adx),
            atr: ATR::new(periods.atr),
            bollinger: BollingerBands::new(periods.bollinger, periods.bollinger_stddev),
            zscore: ZScore::new(periods.zscore),
            volume: VolumeProfile::new(periods.volume),
            nday_low: NDayLow::new(periods.nday_low),
            last_snapshot: None,
        }
    }

    /// Most recent snapshot this stack produced, if warm-up has completed.
    /// Used by chat commands (`force_buy`, `signal_analysis`) that need the
    /// current reading without waiting for the next scheduled tick.
    pub fn last_snapshot(&self) -> Option<IndicatorSnapshot> {
        self.last_snapshot
    }

    /// Folds one closed candle into every indicator and returns a snapshot
    /// once all of them have enough history. Indicators that are not yet
    /// ready return `None` for their field in [`IndicatorSnapshot`] during
    /// warm-up, but the snapshot itself is only emitted once none of the
    /// fields the vote aggregator requires are missing.
    pub fn update(&mut self, candle: &Candle) -> Option<IndicatorSnapshot> {
        let close = candle.close;

        let ema_fast = self.ema_fast.update(close);
        let ema_slow = self.ema_slow.update(close);
        let ema_trend = self.ema_trend.update(close);
        let ema_trend_slope = match (ema_trend, self.prev_ema_trend) {
            (Some(curr), Some(prev)) if !prev.is_zero() => Some(((curr - prev) / prev) * Decimal::from(100)),
            _ => None,
        };
        if ema_trend.is_some() {
            self.prev_ema_trend = ema_trend;
        }

        let rsi = self.rsi.update(close);
        let macd = self.macd.update(close);
        let adx = self.adx.update(candle.high, candle.low, close);
        let plus_di = self.adx.plus_di();
        let minus_di = self.adx.minus_di();
        let atr = self.atr.update(candle.high, candle.low, close);
        let atr_pct = self.atr.atr_percent(close);
        let bollinger = self.bollinger.update(close);
        let zscore = self.zscore.update(close);
        let avg_volume = self.volume.update(candle.volume);
        let relative_volume = self.volume.relative_volume(candle.volume);
        let nday_low = self.nday_low.update(candle.low);

        let (macd_line, macd_signal, macd_histogram) = match macd {
            Some(out) => (Some(out.macd_line), Some(out.signal_line), Some(out.histogram)),
            None => (None, None, None),
        };
        let (bb_upper, bb_middle, bb_lower, bb_percent_b) = match bollinger {
            Some(out) => (Some(out.upper), Some(out.middle), Some(out.lower), Some(out.percent_b)),
            None => (None, None, None, None),
        };

        let ready = ema_fast.is_some()
            && ema_slow.is_some()
            && ema_trend.is_some()
            && rsi.is_some()
            && macd_line.is_some()
            && adx.is_some()
            && atr.is_some()
            && bb_middle.is_some()
            && zscore.is_some()
            && avg_volume.is_some()
            && nday_low.is_some();

        if !ready {
            return None;
        }

        let snapshot = IndicatorSnapshot {
            close,
            ema_fast: ema_fast.unwrap(),
            ema_slow: ema_slow.unwrap(),
            ema_trend: ema_trend.unwrap(),
            ema_trend_slope_pct: ema_trend_slope,
            rsi: rsi.unwrap(),
            macd_line: macd_line.unwrap(),
            macd_signal: macd_signal.unwrap(),
            macd_histogram: macd_histogram.unwrap(),
            adx: adx.unwrap(),
            plus_di: plus_di.unwrap(),
            minus_di: minus_di.unwrap(),
            atr: atr.unwrap(),
            atr_pct: atr_pct.unwrap_or(Decimal::ZERO),
            bb_upper: bb_upper.unwrap(),
            bb_middle: bb_middle.unwrap(),
            bb_lower: bb_lower.unwrap(),
            bb_percent_b: bb_percent_b.unwrap(),
            zscore: zscore.unwrap(),
            volume: candle.volume,
            avg_volume: avg_volume.unwrap(),
            relative_volume: relative_volume.unwrap_or(Decimal::ONE),
            nday_low: nday_low.unwrap(),
        };

        self.last_snapshot = Some(snapshot);
        Some(snapshot)
    }

    pub fn reset(&mut self) {
        self.ema_fast.reset();
        self.ema_slow.reset();
        self.ema_trend.reset();
        self.prev_ema_trend = None;
        self.rsi.reset();
        self.macd.reset();
        self.adx.reset();
        self.atr.reset();
        self.bollinger.reset();
        self.zscore.reset();
        self.volume.reset();
        self.nday_low.reset();
        self.last_snapshot = None;
    }
}

/// Fully-computed indicator readings for a single closed candle, consumed
/// by the vote aggregator and the regime selector. Immutable by design —
/// every downstream stage reads the same frozen view of the market.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSnapshot {
    pub close: Decimal,
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    pub ema_trend: Decimal,
    /// Percent change of the trend EMA versus its previous value; `None` on
    /// the candle the trend EMA first becomes ready.
    pub ema_trend_slope_pct: Option<Decimal>,
    pub rsi: Decimal,
    pub macd_line: Decimal,
    pub macd_signal: Decimal,
    pub macd_histogram: Decimal,
    pub adx: Decimal,
    pub plus_di: Decimal,
    pub minus_di: Decimal,
    pub atr: Decimal,
    pub atr_pct: Decimal,
    pub bb_upper: Decimal,
    pub bb_middle: Decimal,
    pub bb_lower: Decimal,
    pub bb_percent_b: Decimal,
    pub zscore: Decimal,
    pub volume: Decimal,
    pub avg_volume: Decimal,
    pub relative_volume: Decimal,
    pub nday_low: Decimal,
}

impl IndicatorSnapshot {
    pub fn ema_bullish(&self) -> bool {
        self.ema_fast > self.ema_slow
    }

    pub fn is_volume_spike(&self, multiplier: Decimal) -> bool {
        self.relative_volume > multiplier
    }

    pub fn is_ema_trend_declining(&self, threshold_pct: Decimal) -> bool {
        self.ema_trend_slope_pct
            .map(|slope| slope < -threshold_pct)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TimeFrame, TradingPair};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(price: Decimal, volume: Decimal) -> Candle {
        Candle {
            pair: TradingPair::BTCUSDT,
            timeframe: TimeFrame::H1,
            open_time: Utc::now(),
            close_time: Utc::now(),
            open: price,
            high: price + dec!(1),
            low: price - dec!(1),
            close: price,
            volume,
            quote_volume: volume * price,
            trades: 10,
            is_closed: true,
        }
    }

    #[test]
    fn snapshot_emits_only_after_warmup() {
        let mut indicators = SymbolIndicators::new(IndicatorPeriods::default());
        let mut price = dec!(100);
        let mut emitted = false;
        for i in 0..250 {
            price += Decimal::from(i % 3) - Decimal::from(1);
            if let Some(snap) = indicators.update(&candle(price, dec!(1000))) {
                emitted = true;
                assert!(snap.adx >= Decimal::ZERO);
            }
        }
        assert!(emitted);
    }
}
