use rust_decimal::Decimal;

use crate::config::SizingSettings;
use crate::types::Side;

/// Closed-trade statistics the sizer needs, computed by the ledger over its
/// trailing `kelly_lookback_trades` window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeStatistics {
    pub win_count: u32,
    pub loss_count: u32,
    pub avg_win_pct: Decimal,
    pub avg_loss_pct: Decimal,
}

impl TradeStatistics {
    pub fn total_trades(&self) -> u32 {
        self.win_count + self.loss_count
    }

    pub fn win_rate(&self) -> Decimal {
        let total = self.total_trades();
        if total == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.win_count) / Decimal::from(total)
    }

    /// Win/loss payoff ratio b in the Kelly formula f* = p - (1-p)/b.
    /// Falls back to 1 (break-even payoff) when there's no loss history yet,
    /// so an all-winning sample doesn't divide by zero.
    pub fn payoff_ratio(&self) -> Decimal {
        if self.avg_loss_pct.is_zero() {
            Decimal::ONE
        } else {
            self.avg_win_pct / self.avg_loss_pct
        }
    }
}

/// Recommended position size as a fraction (0..1) of available capital,
/// before clamping to `size_min_pct`/`size_max_pct`.
#[derive(Debug, Clone, Copy)]
pub struct SizeRecommendation {
    pub fraction_of_capital: Decimal,
    pub kelly_fraction_raw: Option<Decimal>,
}

/// Computes position size as a fraction of available cash.
///
/// With `use_kelly` on and at least one closed trade on record, sizes via
/// the Kelly criterion (`f* = p - (1-p)/b`, scaled by `kelly_fraction` —
/// full Kelly is never used directly, since it is calibrated to the
/// trailing sample and overshoots badly once that sample is small or stale).
/// Otherwise, and always before enough trade history exists, falls back to
/// a flat size at the midpoint of the configured min/max band.
pub fn recommend_size(stats: &TradeStatistics, settings: &SizingSettings) -> SizeRecommendation {
    let min = settings.size_min_pct / Decimal::from(100);
    let max = settings.size_max_pct / Decimal::from(100);

    if !settings.use_kelly || stats.total_trades() == 0 {
        let flat = (min + max) / Decimal::from(2);
        return SizeRecommendation {
            fraction_of_capital: flat,
            kelly_fraction_raw: None,
        };
    }

    let p = stats.win_rate();
    let b = stats.payoff_ratio();
    let raw_kelly = if b.is_zero() {
        Decimal::ZERO
    } else {
        p - (Decimal::ONE - p) / b
    };

    let scaled = (raw_kelly * settings.kelly_fraction).max(Decimal::ZERO);
    let clamped = scaled.clamp(min, max);

    SizeRecommendation {
        fraction_of_capital: clamped,
        kelly_fraction_raw: Some(raw_kelly),
    }
}

/// Converts a capital fraction and entry price into a quantity, respecting
/// the exchange's minimum notional. Returns `None` when the resulting order
/// would fall below `min_notional`.
pub fn size_to_quantity(
    available_cash: Decimal,
    fraction_of_capital: Decimal,
    entry_price: Decimal,
    min_notional: Decimal,
) -> Option<Decimal> {
    if entry_price.is_zero() {
        return None;
    }
    let notional = available_cash * fraction_of_capital;
    if notional < min_notional {
        return None;
    }
    Some(notional / entry_price)
}

/// AVERAGE_DOWN / PYRAMID_UP add-on sizing: a fraction of the *original*
/// entry notional, not of current available cash, so repeated averaging
/// attempts decay rather than compound.
pub fn averaging_quantity(original_notional: Decimal, fraction: Decimal, price: Decimal) -> Option<Decimal> {
    if price.is_zero() {
        return None;
    }
    Some((original_notional * fraction) / price)
}

/// Guards the `MAX_TOTAL_RISK_MULTIPLIER` invariant: total invested after an
/// averaging fill must not exceed the original notional times the
/// multiplier. `side` is accepted for symmetry with PYRAMID_UP, which has
/// the same cap even though it averages into a winner rather than a loser.
pub fn averaging_within_risk_cap(
    original_notional: Decimal,
    total_invested_after: Decimal,
    max_total_risk_multiplier: Decimal,
    _side: Side,
) -> bool {
    total_invested_after <= original_notional * max_total_risk_multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn no_history_falls_back_to_flat_midpoint_size() {
        let stats = TradeStatistics::default();
        let settings = SizingSettings::default();
        let rec = recommend_size(&stats, &settings);
        assert_eq!(rec.fraction_of_capital, dec!(11.0) / Decimal::from(100));
        assert!(rec.kelly_fraction_raw.is_none());
    }

    #[test]
    fn favorable_edge_scales_up_within_band() {
        let stats = TradeStatistics {
            win_count: 7,
            loss_count: 3,
            avg_win_pct: dec!(4.0),
            avg_loss_pct: dec!(2.0),
        };
        let settings = SizingSettings::default();
        let rec = recommend_size(&stats, &settings);
        assert!(rec.fraction_of_capital >= settings.size_min_pct / Decimal::from(100));
        assert!(rec.fraction_of_capital <= settings.size_max_pct / Decimal::from(100));
        assert!(rec.kelly_fraction_raw.unwrap() > Decimal::ZERO);
    }

    #[test]
    fn sub_min_notional_returns_none() {
        let qty = size_to_quantity(dec!(100), dec!(0.02), dec!(50000), dec!(10));
        assert!(qty.is_none());
    }

    #[test]
    fn risk_multiplier_cap_blocks_excess_averaging() {
        let ok = averaging_within_risk_cap(dec!(1000), dec!(1800), dec!(2.0), Side::Buy);
        let blocked = averaging_within_risk_cap(dec!(1000), dec!(2100), dec!(2.0), Side::Buy);
        assert!(ok);
        assert!(!blocked);
    }
}
