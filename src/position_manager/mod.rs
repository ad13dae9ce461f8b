use rust_decimal::Decimal;

use crate::config::RuntimeConfig;
use crate::sizing::{averaging_quantity, averaging_within_risk_cap};
use crate::types::{AveragingMode, DecisionKind, EntryMode, ExitReason, Position, Side};

/// Outcome of one exit-priority evaluation pass over a single position.
/// Exactly one of these is returned per call — the first applicable step
/// in the ordered protocol wins, and every step after it is skipped for
/// this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionAction {
    None,
    Close { reason: ExitReason },
    ClosePartial { fraction: Decimal, reason: ExitReason },
    ActivateTrailing { new_stop: Decimal },
    UpdateTrailingStop { new_stop: Decimal },
    Average { mode: AveragingMode, quantity: Decimal },
}

/// Evaluates the ordered exit-priority protocol for one position on one
/// closed candle: break-even stop, trailing-stop exit or plain stop-loss,
/// partial take-profit, trailing-stop activation, take-profit, signal exit,
/// then averaging. The first step whose condition holds is applied and
/// every later step is skipped — a position that both hits its stop and
/// would otherwise average in always takes the stop.
///
/// Breakeven itself is never a standalone promotion step here:
/// `partial_tp_taken` promotion (inside `ClosePartial`'s handling) is what
/// flips `breakeven_active` and raises `stop_loss` to the entry price. This
/// function only decides whether a breakeven-promoted position has since
/// traded back through its entry — checked ahead of the trailing/plain stop
/// test below, since both would otherwise also see the same entry-priced
/// `stop_loss` and report it as a less specific reason.
pub fn evaluate_position(
    position: &Position,
    decision: Option<&DecisionKind>,
    config: &RuntimeConfig,
) -> PositionAction {
    if position.breakeven_active && breakeven_stop_violated(position) {
        return PositionAction::Close { reason: ExitReason::Breakeven };
    }

    // Once trailing has taken over, it owns the `stop_loss` field it keeps
    // ratcheting — a breach reports as TrailingStop, not the generic
    // StopLoss reason the same field would otherwise produce.
    if position.trailing_active {
        if trailing_stop_violation(position, config).is_some() {
            return PositionAction::Close { reason: ExitReason::TrailingStop };
        }
    } else if position.should_stop_loss() {
        return PositionAction::Close { reason: ExitReason::StopLoss };
    }

    let pnl_pct = position.pnl_percentage();

    if !position.partial_tp_taken && pnl_pct >= config.exits.partial_tp_trigger_pct {
        return PositionAction::ClosePartial {
            fraction: config.exits.partial_tp_close_fraction,
            reason: ExitReason::PartialTakeProfit,
        };
    }

    if !position.trailing_active && pnl_pct >= config.exits.trail_activation_pct {
        let new_stop = trail_stop_from_current(position, config);
        return PositionAction::ActivateTrailing { new_stop };
    }

    if position.should_take_profit() {
        return PositionAction::Close { reason: ExitReason::TakeProfit };
    }

    if let Some(kind) = decision {
        let opposes = matches!(
            (position.side, kind),
            (Side::Buy, DecisionKind::Sell) | (Side::Sell, DecisionKind::Buy)
        );
        if opposes {
            return PositionAction::Close { reason: ExitReason::SignalExit };
        }
    }

    let averaging = averaging_action(position, config);
    if averaging != PositionAction::None {
        return averaging;
    }

    // Lowest priority: quietly ratchet an already-active trailing stop
    // tighter. Never preempts an exit, partial-TP, activation or averaging
    // decision above.
    if position.trailing_active {
        if let Some(new_stop) = new_stop_if_improved(position, config) {
            return PositionAction::UpdateTrailingStop { new_stop };
        }
    }

    PositionAction::None
}

/// True once price has traded back through the average entry price on a
/// breakeven-promoted position, regardless of where `stop_loss` itself
/// currently sits (a later trailing update may have moved it past entry).
fn breakeven_stop_violated(position: &Position) -> bool {
    match position.side {
        Side::Buy => position.current_price <= position.entry_price,
        Side::Sell => position.current_price >= position.entry_price,
    }
}

fn trail_stop_from_current(position: &Position, config: &RuntimeConfig) -> Decimal {
    let distance = position.current_price * (config.exits.trail_distance_pct / Decimal::from(100));
    match position.side {
        Side::Buy => position.current_price - distance,
        Side::Sell => position.current_price + distance,
    }
}

/// Returns `Some(new_stop)` when the high-water mark has advanced enough to
/// tighten the trailing stop, `None` when the existing stop already covers
/// the current trail distance.
fn new_stop_if_improved(position: &Position, config: &RuntimeConfig) -> Option<Decimal> {
    let distance = position.highest_price_since_entry * (config.exits.trail_distance_pct / Decimal::from(100));
    let candidate = match position.side {
        Side::Buy => position.highest_price_since_entry - distance,
        Side::Sell => position.highest_price_since_entry + distance,
    };
    match (position.side, position.stop_loss) {
        (Side::Buy, Some(current)) if candidate > current => Some(candidate),
        (Side::Sell, Some(current)) if candidate < current => Some(candidate),
        (_, None) => Some(candidate),
        _ => None,
    }
}

fn trailing_stop_violation(position: &Position, config: &RuntimeConfig) -> Option<Decimal> {
    let stop = position.stop_loss.unwrap_or_else(|| trail_stop_from_current(position, config));
    let violated = match position.side {
        Side::Buy => position.current_price <= stop,
        Side::Sell => position.current_price >= stop,
    };
    if violated {
        Some(stop)
    } else {
        None
    }
}

/// AVERAGE_DOWN fires only for mean-reversion entries that have drawn down
/// by `average_down_trigger_pct`; PYRAMID_UP fires only for trend-following
/// entries that have run up by `pyramid_up_trigger_pct`. Both are capped by
/// `max_averaging_attempts` and `max_total_risk_multiplier`.
fn averaging_action(position: &Position, config: &RuntimeConfig) -> PositionAction {
    if position.averaging_count >= config.averaging.max_averaging_attempts {
        return PositionAction::None;
    }

    let move_pct = match position.side {
        Side::Buy => ((position.current_price - position.entry_price) / position.entry_price) * Decimal::from(100),
        Side::Sell => ((position.entry_price - position.current_price) / position.entry_price) * Decimal::from(100),
    };

    let (mode, triggered, fraction) = match position.entry_mode {
        EntryMode::MeanReversion if move_pct <= -config.averaging.average_down_trigger_pct => {
            (AveragingMode::AverageDown, true, config.averaging.average_down_size_fraction)
        }
        EntryMode::TrendFollowing if move_pct >= config.averaging.pyramid_up_trigger_pct => {
            (AveragingMode::PyramidUp, true, config.averaging.pyramid_up_size_fraction)
        }
        _ => (AveragingMode::AverageDown, false, Decimal::ZERO),
    };

    if !triggered {
        return PositionAction::None;
    }

    let original_notional = position.total_invested / Decimal::from(position.averaging_count + 1).max(Decimal::ONE);
    let quantity = match averaging_quantity(original_notional, fraction, position.current_price) {
        Some(q) => q,
        None => return PositionAction::None,
    };

    let total_invested_after = position.total_invested + position.current_price * quantity;
    if !averaging_within_risk_cap(
        position.total_invested,
        total_invested_after,
        config.averaging.max_total_risk_multiplier,
        position.side,
    ) {
        return PositionAction::None;
    }

    PositionAction::Average { mode, quantity }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryMode, PositionStatus, Side, TradingPair};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn base_position() -> Position {
        Position {
            id: "p1".to_string(),
            pair: TradingPair::BTCUSDT,
            side: Side::Buy,
            status: PositionStatus::Open,
            entry_price: dec!(100),
            current_price: dec!(100),
            quantity: dec!(1),
            stop_loss: Some(dec!(95)),
            take_profit: Some(dec!(120)),
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            peak_pnl_pct: Decimal::ZERO,
            opened_at: Utc::now(),
            closed_at: None,
            strategy_id: "regime-engine".to_string(),
            order_ids: vec![],
            oco_order_id: None,
            total_invested: dec!(100),
            commission_paid: dec!(0.1),
            highest_price_since_entry: dec!(100),
            trailing_active: false,
            breakeven_active: false,
            partial_tp_taken: false,
            entry_mode: EntryMode::TrendFollowing,
            entry_votes_delta: 4,
            entry_reasons: vec![],
            averaging_count: 0,
            averaging_entries: vec![],
        }
    }

    #[test]
    fn stop_loss_takes_priority_over_everything_else() {
        let mut pos = base_position();
        pos.update_price(dec!(94));
        let config = RuntimeConfig::default();
        let action = evaluate_position(&pos, None, &config);
        assert_eq!(action, PositionAction::Close { reason: ExitReason::StopLoss });
    }

    #[test]
    fn breakeven_stop_close_takes_priority_over_trailing_stop_close() {
        let mut pos = base_position();
        pos.breakeven_active = true;
        pos.partial_tp_taken = true;
        pos.trailing_active = true;
        pos.stop_loss = Some(dec!(100)); // promoted to entry by close_partial
        pos.update_price(dec!(100)); // back at entry: both breakeven and trailing stops violate
        let config = RuntimeConfig::default();
        let action = evaluate_position(&pos, None, &config);
        assert_eq!(action, PositionAction::Close { reason: ExitReason::Breakeven });
    }

    #[test]
    fn trailing_stop_reports_trailing_once_active_even_above_entry() {
        let mut pos = base_position();
        pos.breakeven_active = true;
        pos.partial_tp_taken = true;
        pos.trailing_active = true;
        pos.stop_loss = Some(dec!(103)); // trailing has since tightened the stop above entry
        pos.update_price(dec!(101)); // above entry, but below the tightened stop
        let config = RuntimeConfig::default();
        let action = evaluate_position(&pos, None, &config);
        // Price never traded back through entry, so the breakeven-stop reason
        // doesn't apply; trailing owns `stop_loss` once active, so the breach
        // reports as TrailingStop rather than the generic StopLoss.
        assert_eq!(action, PositionAction::Close { reason: ExitReason::TrailingStop });
    }

    #[test]
    fn pyramid_up_triggers_for_trend_following_runner() {
        let mut pos = base_position();
        pos.breakeven_active = true;
        pos.trailing_active = true;
        pos.stop_loss = Some(dec!(99));
        pos.partial_tp_taken = true;
        pos.update_price(dec!(102.5));
        let config = RuntimeConfig::default();
        let action = evaluate_position(&pos, None, &config);
        match action {
            PositionAction::Average { mode, .. } => assert_eq!(mode, AveragingMode::PyramidUp),
            other => panic!("expected Average(PyramidUp), got {other:?}"),
        }
    }

    #[test]
    fn signal_exit_fires_when_nothing_else_does_and_decision_opposes_side() {
        let mut pos = base_position();
        pos.breakeven_active = true;
        pos.trailing_active = true;
        pos.stop_loss = Some(dec!(99));
        pos.partial_tp_taken = true;
        pos.entry_mode = EntryMode::MeanReversion;
        pos.update_price(dec!(100.2));
        let config = RuntimeConfig::default();
        let action = evaluate_position(&pos, Some(&DecisionKind::Sell), &config);
        assert_eq!(action, PositionAction::Close { reason: ExitReason::SignalExit });
    }
}
