use rust_decimal::Decimal;

use crate::config::RuntimeConfig;
use crate::indicators::IndicatorSnapshot;
use crate::types::{DecisionKind, RegimeKind};
use crate::votes::{aggregate_votes, Vote, VoteTally};

/// Final BUY/SELL/HOLD decision for one symbol on one closed candle, with
/// the provenance (regime, vote tally, reasons) needed to persist a
/// `SignalRecord` and to seed a new position's `entry_mode`/`entry_reasons`.
#[derive(Debug, Clone)]
pub struct SignalDecision {
    pub kind: DecisionKind,
    pub regime: RegimeKind,
    pub votes: VoteTally,
    pub reasons: Vec<String>,
    /// Initial stop-loss/take-profit template for a BUY decision, `None`
    /// for SELL/HOLD. The caller applies these to the new `Position`.
    pub proposed_stop_loss: Option<Decimal>,
    pub proposed_take_profit: Option<Decimal>,
    /// Set when a vote tally that cleared the buy threshold was blocked
    /// from becoming a BUY — either by an entry filter here, or later by a
    /// portfolio invariant (`position_limit`, `insufficient_cash`) the
    /// caller reports back after this decision is made.
    pub block_reason: Option<String>,
}

/// Entry filters evaluated before a non-HOLD vote tally becomes a BUY/SELL
/// decision. A symbol can satisfy the vote threshold and still be filtered
/// out here, e.g. by sitting too close to its N-day low.
pub struct EntryFilterInputs {
    pub force_buy: bool,
}

/// Produces a decision from an indicator snapshot, the regime currently in
/// effect and the vote tally already computed for this candle.
///
/// The vote threshold applied depends on the regime: a plain MR or TF
/// regime uses `min_votes_for_buy`/`min_votes_for_sell`, while TRANSITION
/// requires `transition_min_votes_for_buy` — a deliberately higher bar,
/// since the regime selector itself isn't confident yet.
pub fn generate_signal(
    snapshot: &IndicatorSnapshot,
    regime: RegimeKind,
    config: &RuntimeConfig,
    filters: &EntryFilterInputs,
) -> SignalDecision {
    let votes = aggregate_votes(snapshot, config);
    let delta = votes.delta();

    let buy_threshold = match regime {
        RegimeKind::Transition => config.votes.transition_min_votes_for_buy,
        _ => config.votes.min_votes_for_buy,
    };
    let sell_threshold = config.votes.min_votes_for_sell;

    let mut reasons = Vec::new();
    let mut block_reason = None;

    let kind = if filters.force_buy {
        reasons.push("force_buy override".to_string());
        DecisionKind::Buy
    } else if delta >= buy_threshold {
        match entry_filter_block_reason(snapshot, regime, config) {
            None => {
                reasons.extend(votes.reasons(Vote::Buy));
                DecisionKind::Buy
            }
            Some(reason) => {
                reasons.push(format!("entry filters blocked buy: {reason}"));
                block_reason = Some(reason.to_string());
                DecisionKind::Hold
            }
        }
    } else if -delta >= sell_threshold {
        reasons.extend(votes.reasons(Vote::Sell));
        DecisionKind::Sell
    } else {
        DecisionKind::Hold
    };

    let (proposed_stop_loss, proposed_take_profit) = if kind == DecisionKind::Buy {
        let (sl, tp) = exit_template(snapshot.close, regime, snapshot, config);
        (Some(sl), Some(tp))
    } else {
        (None, None)
    };

    SignalDecision {
        kind,
        regime,
        votes,
        reasons,
        proposed_stop_loss,
        proposed_take_profit,
        block_reason,
    }
}

/// Initial stop-loss/take-profit template for a new entry. Mean-reversion
/// entries widen their stop with realized volatility
/// (`max(mr_stop_loss_pct, atr_pct * mr_atr_sl_mult)`); trend-following
/// entries use a flat, wider template since they're meant to ride a move.
fn exit_template(entry_price: Decimal, regime: RegimeKind, snapshot: &IndicatorSnapshot, config: &RuntimeConfig) -> (Decimal, Decimal) {
    match regime {
        RegimeKind::MeanReversion => {
            let sl_pct = (config.entry.mr_stop_loss_pct).max(snapshot.atr_pct * config.entry.mr_atr_sl_mult);
            let tp_pct = (config.entry.mr_take_profit_pct).max(snapshot.atr_pct * config.entry.mr_atr_tp_mult);
            (
                entry_price * (Decimal::ONE - sl_pct / Decimal::from(100)),
                entry_price * (Decimal::ONE + tp_pct / Decimal::from(100)),
            )
        }
        RegimeKind::TrendFollowing | RegimeKind::Transition => (
            entry_price * (Decimal::ONE - config.entry.tf_stop_loss_pct / Decimal::from(100)),
            entry_price * (Decimal::ONE + config.entry.tf_take_profit_pct / Decimal::from(100)),
        ),
    }
}

/// Gates an otherwise-qualifying BUY. Checked in order; the first guard that
/// fails names the `block_reason` reported back to the caller — later guards
/// are never evaluated once one has already blocked the entry:
///
/// 1. Falling-knife: close within `no_buy_below_pct` of the trailing N-day
///    low, since a confluence of oversold indicators right at a fresh low
///    is as likely to be a falling knife as a reversal.
/// 2. Volume spike: an abnormal print often marks a blow-off rather than a
///    clean entry.
/// 3. A declining 200-period EMA: don't buy into an accelerating downtrend
///    even if the faster indicators have turned.
/// 4. Regime-specific confirmation: mean-reversion entries require the
///    oversold/z-score/range-bound trio to actually hold together; trend
///    entries require ADX, EMA alignment and MACD to agree with the regime.
fn entry_filter_block_reason(snapshot: &IndicatorSnapshot, regime: RegimeKind, config: &RuntimeConfig) -> Option<&'static str> {
    if !snapshot.nday_low.is_zero() {
        let distance_pct = ((snapshot.close - snapshot.nday_low) / snapshot.nday_low) * Decimal::from(100);
        if distance_pct < config.entry.no_buy_below_pct {
            return Some("falling_knife");
        }
    }

    if snapshot.is_volume_spike(config.entry.volume_spike_mult) {
        return Some("volume_spike");
    }

    if snapshot.is_ema_trend_declining(config.entry.ema200_neg_slope_threshold) {
        return Some("ema_trend_declining");
    }

    let regime_confirms = match regime {
        RegimeKind::MeanReversion => {
            snapshot.rsi < config.entry.mr_rsi_oversold
                && snapshot.zscore < -config.entry.mr_zscore_threshold
                && snapshot.adx < config.entry.mr_adx_max
        }
        RegimeKind::TrendFollowing | RegimeKind::Transition => {
            snapshot.adx > config.regime.adx_high && snapshot.ema_bullish() && snapshot.macd_line > Decimal::ZERO
        }
    };

    if !regime_confirms {
        return Some("regime_filter");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bullish_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: dec!(100),
            ema_fast: dec!(102),
            ema_slow: dec!(98),
            ema_trend: dec!(95),
            ema_trend_slope_pct: Some(dec!(0.2)),
            rsi: dec!(25),
            macd_line: dec!(1),
            macd_signal: dec!(0.5),
            macd_histogram: dec!(0.5),
            adx: dec!(30),
            plus_di: dec!(30),
            minus_di: dec!(10),
            atr: dec!(2),
            atr_pct: dec!(2),
            bb_upper: dec!(110),
            bb_middle: dec!(100),
            bb_lower: dec!(101), // close below lower band -> buy vote
            bb_percent_b: dec!(0.1),
            zscore: dec!(-2.5),
            volume: dec!(1000),
            avg_volume: dec!(1000),
            relative_volume: dec!(1),
            nday_low: dec!(80),
        }
    }

    #[test]
    fn strong_confluence_yields_buy_decision() {
        let snap = bullish_snapshot();
        let config = RuntimeConfig::default();
        let decision = generate_signal(&snap, RegimeKind::TrendFollowing, &config, &EntryFilterInputs { force_buy: false });
        assert_eq!(decision.kind, DecisionKind::Buy);
    }

    #[test]
    fn same_tally_needs_higher_bar_during_transition() {
        let snap = bullish_snapshot();
        let mut config = RuntimeConfig::default();
        config.votes.transition_min_votes_for_buy = 99;
        let decision = generate_signal(&snap, RegimeKind::Transition, &config, &EntryFilterInputs { force_buy: false });
        assert_eq!(decision.kind, DecisionKind::Hold);
    }

    #[test]
    fn force_buy_bypasses_vote_threshold() {
        let mut snap = bullish_snapshot();
        snap.ema_fast = dec!(99);
        snap.ema_slow = dec!(100);
        snap.rsi = dec!(50);
        snap.macd_histogram = Decimal::ZERO;
        snap.zscore = Decimal::ZERO;
        snap.relative_volume = dec!(1);
        let config = RuntimeConfig::default();
        let decision = generate_signal(&snap, RegimeKind::TrendFollowing, &config, &EntryFilterInputs { force_buy: true });
        assert_eq!(decision.kind, DecisionKind::Buy);
    }

    #[test]
    fn buy_near_n_day_low_is_filtered_to_hold() {
        let mut snap = bullish_snapshot();
        snap.nday_low = dec!(99.8);
        let config = RuntimeConfig::default();
        let decision = generate_signal(&snap, RegimeKind::TrendFollowing, &config, &EntryFilterInputs { force_buy: false });
        assert_eq!(decision.kind, DecisionKind::Hold);
        assert_eq!(decision.block_reason.as_deref(), Some("falling_knife"));
    }

    #[test]
    fn volume_spike_blocks_an_otherwise_qualifying_buy() {
        let mut snap = bullish_snapshot();
        snap.relative_volume = dec!(3); // above the default 2.0x spike multiplier
        let config = RuntimeConfig::default();
        let decision = generate_signal(&snap, RegimeKind::TrendFollowing, &config, &EntryFilterInputs { force_buy: false });
        assert_eq!(decision.kind, DecisionKind::Hold);
        assert_eq!(decision.block_reason.as_deref(), Some("volume_spike"));
    }

    #[test]
    fn declining_long_horizon_ema_blocks_an_otherwise_qualifying_buy() {
        let mut snap = bullish_snapshot();
        snap.ema_trend_slope_pct = Some(dec!(-1.0)); // steeper than the default 0.5% threshold
        let config = RuntimeConfig::default();
        let decision = generate_signal(&snap, RegimeKind::TrendFollowing, &config, &EntryFilterInputs { force_buy: false });
        assert_eq!(decision.kind, DecisionKind::Hold);
        assert_eq!(decision.block_reason.as_deref(), Some("ema_trend_declining"));
    }

    fn mean_reversion_snapshot() -> IndicatorSnapshot {
        let mut snap = bullish_snapshot();
        snap.adx = dec!(15); // below adx_high, below mr_adx_max
        snap.plus_di = dec!(15);
        snap.minus_di = dec!(15);
        snap
    }

    #[test]
    fn mean_reversion_gate_passes_when_oversold_zscore_and_range_bound_agree() {
        let snap = mean_reversion_snapshot();
        let config = RuntimeConfig::default();
        let decision = generate_signal(&snap, RegimeKind::MeanReversion, &config, &EntryFilterInputs { force_buy: false });
        assert_eq!(decision.kind, DecisionKind::Buy);
    }

    #[test]
    fn mean_reversion_gate_blocks_when_adx_has_already_picked_up() {
        let mut snap = mean_reversion_snapshot();
        snap.adx = dec!(40); // above mr_adx_max: ranging read no longer trustworthy
        let config = RuntimeConfig::default();
        let decision = generate_signal(&snap, RegimeKind::MeanReversion, &config, &EntryFilterInputs { force_buy: false });
        assert_eq!(decision.kind, DecisionKind::Hold);
        assert_eq!(decision.block_reason.as_deref(), Some("regime_filter"));
    }
}
