//! End-to-end scenario tests tying the signal generator, position manager,
//! regime selector, sizer and ledger together the way one worker tick does.
//! Each scenario seeds literal indicator/price values rather than driving
//! raw candles through the full indicator warm-up, since the pipeline
//! stages are already unit-tested against real candle series individually
//! (see `indicators::snapshot`, `regime`, `signal`, `position_manager`).

#![cfg(test)]

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::RuntimeConfig;
use crate::indicators::IndicatorSnapshot;
use crate::ledger::PortfolioLedger;
use crate::position_manager::{evaluate_position, PositionAction};
use crate::regime::RegimeSelector;
use crate::signal::{generate_signal, EntryFilterInputs};
use crate::sizing::{recommend_size, size_to_quantity, TradeStatistics};
use crate::types::{
    AveragingMode, DecisionKind, EntryMode, ExitReason, Position, PositionStatus, RegimeKind,
    Side, TradeRecord, TradingPair,
};

fn flat_snapshot(close: Decimal, nday_low: Decimal) -> IndicatorSnapshot {
    IndicatorSnapshot {
        close,
        ema_fast: close,
        ema_slow: close,
        ema_trend: close,
        ema_trend_slope_pct: Some(Decimal::ZERO),
        rsi: dec!(50),
        macd_line: Decimal::ZERO,
        macd_signal: Decimal::ZERO,
        macd_histogram: Decimal::ZERO,
        adx: dec!(15),
        plus_di: dec!(15),
        minus_di: dec!(15),
        atr: close * dec!(0.01),
        atr_pct: dec!(1),
        bb_upper: close + Decimal::ONE,
        bb_middle: close,
        bb_lower: close - Decimal::ONE,
        bb_percent_b: dec!(0.5),
        zscore: Decimal::ZERO,
        volume: dec!(1000),
        avg_volume: dec!(1000),
        relative_volume: Decimal::ONE,
        nday_low,
    }
}

fn open_position(
    entry_price: Decimal,
    quantity: Decimal,
    entry_mode: EntryMode,
    stop_loss: Decimal,
    take_profit: Decimal,
) -> Position {
    let mut position = Position::new(
        TradingPair::BTCUSDT,
        Side::Buy,
        entry_price,
        quantity,
        "regime-engine".to_string(),
        entry_mode,
        0,
        vec![],
        entry_price * quantity * dec!(0.0009),
    );
    position.stop_loss = Some(stop_loss);
    position.take_profit = Some(take_profit);
    position
}

/// S1 — a mean-reversion entry whose next candle gaps down through its
/// stop loss. Oversold RSI, a deep negative z-score and a range-bound ADX
/// push the vote tally to a MR buy; the position manager closes the whole
/// position on the following tick once price trades through the stop.
#[tokio::test]
async fn s1_mean_reversion_entry_then_stop_loss_exit() {
    let config = RuntimeConfig::default();

    let mut snapshot = flat_snapshot(dec!(100), dec!(98));
    snapshot.rsi = dec!(22);
    snapshot.zscore = dec!(-2.1);
    snapshot.bb_lower = dec!(101); // close trades below the lower band
    snapshot.adx = dec!(15);

    let decision = generate_signal(&snapshot, RegimeKind::MeanReversion, &config, &EntryFilterInputs { force_buy: false });
    assert_eq!(decision.kind, DecisionKind::Buy);

    let cash = dec!(1000);
    let sizing = recommend_size(&TradeStatistics::default(), &config.sizing);
    let quantity = size_to_quantity(cash, sizing.fraction_of_capital, snapshot.close, dec!(10)).unwrap();
    assert!(quantity > Decimal::ZERO);

    let sl = decision.proposed_stop_loss.unwrap();
    let tp = decision.proposed_take_profit.unwrap();
    assert!(sl < snapshot.close);

    let mut position = open_position(snapshot.close, quantity, EntryMode::MeanReversion, sl, tp);

    // Next candle closes at 96.50: through the MR stop template.
    position.update_price(dec!(96.50));
    let action = evaluate_position(&position, None, &config);
    assert_eq!(action, PositionAction::Close { reason: ExitReason::StopLoss });

    let realized = position.calculate_pnl(dec!(96.50));
    assert!(realized < Decimal::ZERO);
}

/// S2 — a trend-following entry that partial-take-profits, promotes to
/// breakeven, then activates and gets stopped out by its trailing stop.
#[tokio::test]
async fn s2_trend_follow_partial_tp_then_trailing_exit() {
    let mut config = RuntimeConfig::default();
    config.exits.partial_tp_trigger_pct = dec!(1.5);
    config.exits.trail_distance_pct = dec!(1.0);

    let mut position = open_position(dec!(200), dec!(10), EntryMode::TrendFollowing, dec!(190), dec!(220));

    // +1.5%: partial take-profit is the first step whose condition holds —
    // breakeven isn't a standalone step, so nothing preempts it here.
    position.update_price(dec!(203));
    let action = evaluate_position(&position, None, &config);
    assert_eq!(
        action,
        PositionAction::ClosePartial { fraction: config.exits.partial_tp_close_fraction, reason: ExitReason::PartialTakeProfit }
    );

    // Apply the same effects `close_partial` applies: half the position
    // closes, and taking the partial promotes the remainder to breakeven.
    position.partial_tp_taken = true;
    position.breakeven_active = true;
    position.stop_loss = Some(position.entry_price);
    position.quantity = dec!(5); // half closed

    // +3% from entry: trailing activation.
    position.update_price(dec!(206));
    let action = evaluate_position(&position, None, &config);
    match action {
        PositionAction::ActivateTrailing { new_stop } => {
            position.trailing_active = true;
            position.stop_loss = Some(new_stop);
        }
        other => panic!("expected ActivateTrailing, got {other:?}"),
    }

    // Pulls back to 203.00: trail distance 1% of the 206 high-water mark is
    // 2.06, so the trailing stop sits at 203.94 and this tick trades through it.
    position.update_price(dec!(203.00));
    let action = evaluate_position(&position, None, &config);
    assert_eq!(action, PositionAction::Close { reason: ExitReason::TrailingStop });
}

/// S3 — averaging down honors the total-risk multiplier: the first
/// drawdown qualifies, a deeper one that would exceed the cap does not.
#[tokio::test]
async fn s3_average_down_respects_risk_multiplier_cap() {
    let mut config = RuntimeConfig::default();
    config.averaging.average_down_trigger_pct = dec!(5.0);
    config.averaging.average_down_size_fraction = dec!(0.5);
    config.averaging.max_total_risk_multiplier = dec!(1.5);
    config.averaging.max_averaging_attempts = 2;

    let mut position = open_position(dec!(50), dec!(6), EntryMode::MeanReversion, dec!(45), dec!(55));
    assert_eq!(position.total_invested, dec!(300));

    // -5.2%: qualifies for AVERAGE_DOWN at 50% of the original notional.
    position.update_price(dec!(47.40));
    let action = evaluate_position(&position, None, &config);
    match action {
        PositionAction::Average { mode, quantity } => {
            assert_eq!(mode, AveragingMode::AverageDown);
            position.apply_averaging(dec!(47.40), quantity, AveragingMode::AverageDown, Decimal::ZERO);
        }
        other => panic!("expected Average(AverageDown), got {other:?}"),
    }
    assert!(position.total_invested <= dec!(450));

    // Further drop, but total_invested + new fill would exceed the cap.
    position.update_price(dec!(44.80));
    let action = evaluate_position(&position, None, &config);
    assert_eq!(action, PositionAction::None);
}

/// S4 — leaving TRANSITION commits to TREND_FOLLOWING on the very first
/// high-ADX reading; a subsequent low-ADX reading that arrives before
/// `min_dwell_minutes` has elapsed is absorbed and TREND_FOLLOWING holds;
/// only once the dwell window has passed does the same low reading commit
/// MEAN_REVERSION.
#[tokio::test]
async fn s4_regime_dwell_suppresses_a_premature_flip() {
    let config = RuntimeConfig::default(); // min_dwell_minutes = 30
    let mut selector = RegimeSelector::new(TradingPair::BTCUSDT);
    let base_time: chrono::DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();

    let mut trace = Vec::new();

    // First high-ADX reading: leaving TRANSITION is never dwell-gated.
    trace.push(selector.update(&flat_snapshot(dec!(100), dec!(90)).with_adx(dec!(26)), &config.regime, base_time));
    assert_eq!(selector.state().current_regime, RegimeKind::TrendFollowing);

    // 10 minutes later, ADX drops into ranging territory, but dwell
    // (30 minutes) hasn't elapsed since TrendFollowing was entered: the old
    // mode holds.
    trace.push(selector.update(
        &flat_snapshot(dec!(100), dec!(90)).with_adx(dec!(19)),
        &config.regime,
        base_time + chrono::Duration::minutes(10),
    ));
    assert_eq!(selector.state().current_regime, RegimeKind::TrendFollowing);

    // 36 minutes after entering TrendFollowing (past the 30-minute dwell),
    // the same low-ADX reading finally commits MeanReversion.
    trace.push(selector.update(
        &flat_snapshot(dec!(100), dec!(90)).with_adx(dec!(19)),
        &config.regime,
        base_time + chrono::Duration::minutes(36),
    ));

    assert_eq!(trace, vec![RegimeKind::TrendFollowing, RegimeKind::TrendFollowing, RegimeKind::MeanReversion]);
}

/// S5 — replaying the same sequence of closed-trade records twice never
/// produces duplicate trades; the ledger's idempotency key absorbs the
/// replay as a no-op.
#[tokio::test]
async fn s5_replaying_the_same_trade_history_is_idempotent() {
    let ledger = PortfolioLedger::new(":memory:").await.unwrap();
    ledger.add_symbol(TradingPair::BTCUSDT).await.unwrap();

    let base_time = Utc::now();
    let trades: Vec<TradeRecord> = (0..3)
        .map(|i| TradeRecord {
            id: format!("trade-{i}"),
            position_id: format!("pos-{i}"),
            symbol: TradingPair::BTCUSDT,
            side: Side::Buy,
            entry_price: dec!(100),
            exit_price: dec!(105),
            quantity: dec!(1),
            realized_pnl: dec!(5),
            commission_paid: dec!(0.18),
            opened_at: base_time,
            closed_at: base_time,
            candle_open_time: base_time + chrono::Duration::hours(i as i64),
            reason: ExitReason::TakeProfit,
            entry_mode: EntryMode::TrendFollowing,
        })
        .collect();

    for trade in &trades {
        ledger.record_trade(trade).await.unwrap();
    }
    let first_pass = ledger.get_closed_trades(Some(TradingPair::BTCUSDT), 10).await.unwrap();
    assert_eq!(first_pass.len(), 3);

    // Restart-and-replay: the exact same records come through again.
    for trade in &trades {
        ledger.record_trade(trade).await.unwrap();
    }
    let second_pass = ledger.get_closed_trades(Some(TradingPair::BTCUSDT), 10).await.unwrap();
    assert_eq!(second_pass.len(), 3);
}

/// S6 — strong buy-side votes are still blocked when price sits within the
/// falling-knife band of its trailing low; the decision is a HOLD, not a
/// BUY, and carries the blocking reason.
#[tokio::test]
async fn s6_falling_knife_blocks_an_otherwise_qualifying_buy() {
    let config = RuntimeConfig::default();

    let mut snapshot = flat_snapshot(dec!(100), dec!(95.30)); // close is 4.9% above the low
    snapshot.ema_fast = dec!(102);
    snapshot.ema_slow = dec!(98);
    snapshot.rsi = dec!(25);
    snapshot.macd_line = dec!(1);
    snapshot.macd_signal = dec!(0.2);
    snapshot.macd_histogram = dec!(0.8);
    snapshot.adx = dec!(30);
    snapshot.plus_di = dec!(30);
    snapshot.minus_di = dec!(10);
    snapshot.bb_lower = dec!(101);
    snapshot.zscore = dec!(-2.5);
    snapshot.relative_volume = dec!(3);
    snapshot.nday_low = dec!(99.8); // close is within 1% of the low: falling-knife band

    let decision = generate_signal(&snapshot, RegimeKind::TrendFollowing, &config, &EntryFilterInputs { force_buy: false });

    assert_eq!(decision.kind, DecisionKind::Hold);
    assert!(decision.reasons.iter().any(|r| r.contains("entry filters blocked buy")));
    assert_eq!(decision.block_reason.as_deref(), Some("falling_knife"));
    assert!(decision.votes.delta() >= config.votes.min_votes_for_buy);
}

trait WithAdx {
    fn with_adx(self, adx: Decimal) -> Self;
}

impl WithAdx for IndicatorSnapshot {
    fn with_adx(mut self, adx: Decimal) -> Self {
        self.adx = adx;
        self.plus_di = adx;
        self.minus_di = dec!(10);
        self
    }
}

#[tokio::test]
async fn closed_position_invariant_entry_price_stays_between_stop_and_target() {
    let position = open_position(dec!(100), dec!(1), EntryMode::TrendFollowing, dec!(95), dec!(120));
    assert!(position.stop_loss.unwrap() <= position.entry_price);
    assert!(position.entry_price <= position.take_profit.unwrap());
    assert_eq!(position.status, PositionStatus::Open);
}
