use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AveragingMode, EntryMode, Side, TradingPair};

/// A single closed trade, as written to the durable ledger. One row per
/// exit fill — a position closed via partial take-profit then a final
/// stop-loss produces two `TradeRecord`s sharing a `position_id`.
///
/// Idempotent replay keys on `(symbol, candle_open_time, reason)`: the
/// scheduler may re-process the same closed candle after a restart, and the
/// ledger must treat a second attempt to record the same exit as a no-op
/// rather than a duplicate trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub position_id: String,
    pub symbol: TradingPair,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
    pub commission_paid: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// Open time of the candle whose close triggered this exit. Part of the
    /// idempotency key, not just a timestamp.
    pub candle_open_time: DateTime<Utc>,
    pub reason: ExitReason,
    pub entry_mode: EntryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    Breakeven,
    TrailingStop,
    PartialTakeProfit,
    TakeProfit,
    SignalExit,
    Liquidation,
}

/// One vote-and-decision record, written whenever the signal generator
/// reaches a non-HOLD decision (and optionally for HOLD, for diagnostics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: String,
    pub symbol: TradingPair,
    pub candle_open_time: DateTime<Utc>,
    pub decision: DecisionKind,
    pub regime: RegimeKind,
    pub votes_buy: i32,
    pub votes_sell: i32,
    pub reasons: Vec<String>,
    pub executed: bool,
    /// Why a vote tally that cleared the buy threshold still didn't open a
    /// position, e.g. `"falling_knife"`, `"volume_spike"`, `"position_limit"`.
    /// `None` when the decision wasn't a blocked BUY.
    pub block_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeKind {
    MeanReversion,
    TrendFollowing,
    Transition,
}

/// Single-row (`id = 1`) snapshot of account-level state, upserted after
/// every tick that changes cash or equity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash_balance: Decimal,
    pub total_equity: Decimal,
    pub realized_pnl_total: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Per-symbol hysteresis state for the regime selector, persisted so a
/// restart doesn't discard dwell-time progress or flip-flop the regime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub symbol: TradingPair,
    pub current_regime: RegimeKind,
    pub entered_regime_at: DateTime<Utc>,
    pub candles_in_regime: u32,
}

/// A symbol the scheduler is responsible for polling. `active = false`
/// marks a symbol the scheduler has permanently stopped fetching after a
/// `PermanentUpstream` error, without removing its historical records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedSymbol {
    pub symbol: TradingPair,
    pub active: bool,
    pub last_fetched_candle_open_time: Option<DateTime<Utc>>,
}

impl From<AveragingMode> for &'static str {
    fn from(mode: AveragingMode) -> Self {
        match mode {
            AveragingMode::AverageDown => "AVERAGE_DOWN",
            AveragingMode::PyramidUp => "PYRAMID_UP",
        }
    }
}
