use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::sizing::TradeStatistics;
use crate::types::{
    DecisionKind, EntryMode, ExitReason, Position, PositionStatus, RegimeKind, RegimeState, Side,
    SignalRecord, TradeRecord, TradingPair, TrackedSymbol,
};

/// Durable portfolio ledger backed by SQLite. Every mutation the scheduler
/// makes to cash, positions or regime state goes through here so a restart
/// can rebuild in-memory state from the last committed row rather than
/// replaying from genesis.
pub struct PortfolioLedger {
    pool: SqlitePool,
}

impl PortfolioLedger {
    pub async fn new(db_path: &str) -> EngineResult<Self> {
        info!(db_path, "opening portfolio ledger");

        let options = SqliteConnectOptions::from_str(db_path)
            .map_err(|e| EngineError::Configuration(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.create_schema().await?;
        Ok(ledger)
    }

    async fn create_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                pair TEXT NOT NULL,
                side TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                current_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                stop_loss TEXT,
                take_profit TEXT,
                unrealized_pnl TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                peak_pnl_pct TEXT NOT NULL DEFAULT '0',
                total_invested TEXT NOT NULL,
                commission_paid TEXT NOT NULL,
                highest_price_since_entry TEXT NOT NULL,
                trailing_active INTEGER NOT NULL DEFAULT 0,
                breakeven_active INTEGER NOT NULL DEFAULT 0,
                partial_tp_taken INTEGER NOT NULL DEFAULT 0,
                entry_mode TEXT NOT NULL,
                entry_votes_delta INTEGER NOT NULL DEFAULT 0,
                entry_reasons TEXT NOT NULL DEFAULT '[]',
                averaging_count INTEGER NOT NULL DEFAULT 0,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                strategy_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)")
            .execute(&self.pool)
            .await?;

        // The UNIQUE constraint is the whole idempotency mechanism: a
        // restart that re-processes an already-recorded closed candle hits
        // a constraint violation on the second insert, which the caller
        // treats as success rather than a duplicate trade.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades_history (
                id TEXT PRIMARY KEY,
                position_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                commission_paid TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT NOT NULL,
                candle_open_time TEXT NOT NULL,
                reason TEXT NOT NULL,
                entry_mode TEXT NOT NULL,
                UNIQUE(symbol, candle_open_time, reason)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_history_symbol ON trades_history(symbol)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals_history (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                candle_open_time TEXT NOT NULL,
                decision TEXT NOT NULL,
                regime TEXT NOT NULL,
                votes_buy INTEGER NOT NULL,
                votes_sell INTEGER NOT NULL,
                reasons TEXT NOT NULL,
                executed INTEGER NOT NULL DEFAULT 0,
                block_reason TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(symbol, candle_open_time)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                cash_balance TEXT NOT NULL,
                total_equity TEXT NOT NULL,
                realized_pnl_total TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS regime_state (
                symbol TEXT PRIMARY KEY,
                current_regime TEXT NOT NULL,
                entered_regime_at TEXT NOT NULL,
                candles_in_regime INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // The set of tracked symbols is mutated only by chat commands
        // (add/remove); the scheduler reads this table to decide which
        // workers to spawn rather than trusting the static config list.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_symbols (
                symbol TEXT PRIMARY KEY,
                active INTEGER NOT NULL DEFAULT 1,
                last_fetched_candle_open_time TEXT,
                added_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn add_symbol(&self, symbol: TradingPair) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_symbols (symbol, active, last_fetched_candle_open_time, added_at)
            VALUES (?, 1, NULL, ?)
            ON CONFLICT(symbol) DO UPDATE SET active = 1
            "#,
        )
        .bind(symbol.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_symbol(&self, symbol: TradingPair) -> EngineResult<()> {
        sqlx::query("UPDATE tracked_symbols SET active = 0 WHERE symbol = ?")
            .bind(symbol.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_tracked_symbols(&self) -> EngineResult<Vec<TrackedSymbol>> {
        let rows = sqlx::query("SELECT symbol, active, last_fetched_candle_open_time FROM tracked_symbols")
            .fetch_all(&self.pool)
            .await?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(TrackedSymbol {
                symbol: parse_trading_pair(row.get("symbol"))?,
                active: row.get::<i32, _>("active") != 0,
                last_fetched_candle_open_time: row
                    .get::<Option<String>, _>("last_fetched_candle_open_time")
                    .and_then(|s| parse_timestamp(&s).ok()),
            });
        }
        Ok(symbols)
    }

    pub async fn get_closed_trades(&self, symbol: Option<TradingPair>, limit: usize) -> EngineResult<Vec<TradeRecord>> {
        let rows = if let Some(symbol) = symbol {
            sqlx::query(
                r#"
                SELECT id, position_id, symbol, side, entry_price, exit_price, quantity,
                       realized_pnl, commission_paid, opened_at, closed_at,
                       candle_open_time, reason, entry_mode
                FROM trades_history WHERE symbol = ? ORDER BY closed_at DESC LIMIT ?
                "#,
            )
            .bind(symbol.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT id, position_id, symbol, side, entry_price, exit_price, quantity,
                       realized_pnl, commission_paid, opened_at, closed_at,
                       candle_open_time, reason, entry_mode
                FROM trades_history ORDER BY closed_at DESC LIMIT ?
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };

        let mut trades = Vec::new();
        for row in rows {
            trades.push(TradeRecord {
                id: row.get("id"),
                position_id: row.get("position_id"),
                symbol: parse_trading_pair(row.get("symbol"))?,
                side: parse_side(row.get("side"))?,
                entry_price: decimal(row.get("entry_price"))?,
                exit_price: decimal(row.get("exit_price"))?,
                quantity: decimal(row.get("quantity"))?,
                realized_pnl: decimal(row.get("realized_pnl"))?,
                commission_paid: decimal(row.get("commission_paid"))?,
                opened_at: parse_timestamp(row.get("opened_at"))?,
                closed_at: parse_timestamp(row.get("closed_at"))?,
                candle_open_time: parse_timestamp(row.get("candle_open_time"))?,
                reason: parse_exit_reason(row.get("reason"))?,
                entry_mode: parse_entry_mode(row.get("entry_mode"))?,
            });
        }
        Ok(trades)
    }

    pub async fn upsert_position(&self, position: &Position) -> EngineResult<()> {
        let entry_reasons = serde_json::to_string(&position.entry_reasons).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO positions (
                id, pair, side, status, entry_price, current_price, quantity,
                stop_loss, take_profit, unrealized_pnl, realized_pnl, peak_pnl_pct,
                total_invested, commission_paid, highest_price_since_entry,
                trailing_active, breakeven_active, partial_tp_taken,
                entry_mode, entry_votes_delta, entry_reasons, averaging_count,
                opened_at, closed_at, strategy_id, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                current_price = excluded.current_price,
                quantity = excluded.quantity,
                stop_loss = excluded.stop_loss,
                take_profit = excluded.take_profit,
                unrealized_pnl = excluded.unrealized_pnl,
                realized_pnl = excluded.realized_pnl,
                peak_pnl_pct = excluded.peak_pnl_pct,
                total_invested = excluded.total_invested,
                commission_paid = excluded.commission_paid,
                highest_price_since_entry = excluded.highest_price_since_entry,
                trailing_active = excluded.trailing_active,
                breakeven_active = excluded.breakeven_active,
                partial_tp_taken = excluded.partial_tp_taken,
                averaging_count = excluded.averaging_count,
                closed_at = excluded.closed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&position.id)
        .bind(position.pair.as_str())
        .bind(format!("{:?}", position.side))
        .bind(format!("{:?}", position.status))
        .bind(position.entry_price.to_string())
        .bind(position.current_price.to_string())
        .bind(position.quantity.to_string())
        .bind(position.stop_loss.map(|p| p.to_string()))
        .bind(position.take_profit.map(|p| p.to_string()))
        .bind(position.unrealized_pnl.to_string())
        .bind(position.realized_pnl.to_string())
        .bind(position.peak_pnl_pct.to_string())
        .bind(position.total_invested.to_string())
        .bind(position.commission_paid.to_string())
        .bind(position.highest_price_since_entry.to_string())
        .bind(position.trailing_active as i32)
        .bind(position.breakeven_active as i32)
        .bind(position.partial_tp_taken as i32)
        .bind(entry_mode_str(position.entry_mode))
        .bind(position.entry_votes_delta)
        .bind(entry_reasons)
        .bind(position.averaging_count)
        .bind(position.opened_at.to_rfc3339())
        .bind(position.closed_at.map(|t| t.to_rfc3339()))
        .bind(&position.strategy_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_open_positions(&self) -> EngineResult<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pair, side, status, entry_price, current_price, quantity,
                   stop_loss, take_profit, unrealized_pnl, realized_pnl, peak_pnl_pct,
                   total_invested, commission_paid, highest_price_since_entry,
                   trailing_active, breakeven_active, partial_tp_taken,
                   entry_mode, entry_votes_delta, entry_reasons, averaging_count,
                   opened_at, closed_at, strategy_id
            FROM positions
            WHERE status = 'Open'
            ORDER BY opened_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut positions = Vec::new();
        for row in rows {
            let entry_reasons: Vec<String> = row
                .get::<Option<String>, _>("entry_reasons")
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default();

            positions.push(Position {
                id: row.get("id"),
                pair: parse_trading_pair(row.get("pair"))?,
                side: parse_side(row.get("side"))?,
                status: PositionStatus::Open,
                entry_price: decimal(row.get("entry_price"))?,
                current_price: decimal(row.get("current_price"))?,
                quantity: decimal(row.get("quantity"))?,
                stop_loss: optional_decimal(row.get("stop_loss")),
                take_profit: optional_decimal(row.get("take_profit")),
                unrealized_pnl: decimal(row.get("unrealized_pnl"))?,
                realized_pnl: decimal(row.get("realized_pnl"))?,
                peak_pnl_pct: decimal(row.get("peak_pnl_pct"))?,
                total_invested: decimal(row.get("total_invested"))?,
                commission_paid: decimal(row.get("commission_paid"))?,
                highest_price_since_entry: decimal(row.get("highest_price_since_entry"))?,
                trailing_active: row.get::<i32, _>("trailing_active") != 0,
                breakeven_active: row.get::<i32, _>("breakeven_active") != 0,
                partial_tp_taken: row.get::<i32, _>("partial_tp_taken") != 0,
                entry_mode: parse_entry_mode(row.get("entry_mode"))?,
                entry_votes_delta: row.get("entry_votes_delta"),
                entry_reasons,
                averaging_count: row.get::<i64, _>("averaging_count") as u32,
                opened_at: parse_timestamp(row.get("opened_at"))?,
                closed_at: None,
                strategy_id: row.get("strategy_id"),
                order_ids: Vec::new(),
                oco_order_id: None,
                averaging_entries: Vec::new(),
            });
        }

        Ok(positions)
    }

    /// Records a closed-trade row. On a unique-constraint violation against
    /// `(symbol, candle_open_time, reason)` this treats the write as an
    /// already-applied replay and returns `Ok(())` rather than propagating
    /// the error — the defining idempotency behavior of the ledger.
    pub async fn record_trade(&self, trade: &TradeRecord) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades_history (
                id, position_id, symbol, side, entry_price, exit_price, quantity,
                realized_pnl, commission_paid, opened_at, closed_at,
                candle_open_time, reason, entry_mode
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.position_id)
        .bind(trade.symbol.as_str())
        .bind(format!("{:?}", trade.side))
        .bind(trade.entry_price.to_string())
        .bind(trade.exit_price.to_string())
        .bind(trade.quantity.to_string())
        .bind(trade.realized_pnl.to_string())
        .bind(trade.commission_paid.to_string())
        .bind(trade.opened_at.to_rfc3339())
        .bind(trade.closed_at.to_rfc3339())
        .bind(trade.candle_open_time.to_rfc3339())
        .bind(exit_reason_str(trade.reason))
        .bind(entry_mode_str(trade.entry_mode))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let engine_err = EngineError::from(err);
                if engine_err.is_idempotent_conflict() {
                    info!(trade_id = %trade.id, "duplicate trade replay ignored");
                    Ok(())
                } else {
                    Err(engine_err)
                }
            }
        }
    }

    pub async fn recent_trade_statistics(&self, symbol: TradingPair, lookback: usize) -> EngineResult<TradeStatistics> {
        let rows = sqlx::query(
            r#"
            SELECT realized_pnl, entry_price, quantity
            FROM trades_history
            WHERE symbol = ?
            ORDER BY closed_at DESC
            LIMIT ?
            "#,
        )
        .bind(symbol.as_str())
        .bind(lookback as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut win_count = 0u32;
        let mut loss_count = 0u32;
        let mut win_pct_sum = Decimal::ZERO;
        let mut loss_pct_sum = Decimal::ZERO;

        for row in rows {
            let pnl = decimal(row.get("realized_pnl"))?;
            let entry_price: Decimal = decimal(row.get("entry_price"))?;
            let quantity: Decimal = decimal(row.get("quantity"))?;
            let basis = entry_price * quantity;
            if basis.is_zero() {
                continue;
            }
            let pct = (pnl / basis) * Decimal::from(100);
            if pnl >= Decimal::ZERO {
                win_count += 1;
                win_pct_sum += pct;
            } else {
                loss_count += 1;
                loss_pct_sum += pct.abs();
            }
        }

        Ok(TradeStatistics {
            win_count,
            loss_count,
            avg_win_pct: if win_count > 0 { win_pct_sum / Decimal::from(win_count) } else { Decimal::ZERO },
            avg_loss_pct: if loss_count > 0 { loss_pct_sum / Decimal::from(loss_count) } else { Decimal::ZERO },
        })
    }

    pub async fn record_signal(&self, signal: &SignalRecord) -> EngineResult<()> {
        let reasons = serde_json::to_string(&signal.reasons).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(
            r#"
            INSERT INTO signals_history (
                id, symbol, candle_open_time, decision, regime, votes_buy, votes_sell,
                reasons, executed, block_reason, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal.id)
        .bind(signal.symbol.as_str())
        .bind(signal.candle_open_time.to_rfc3339())
        .bind(decision_kind_str(signal.decision))
        .bind(regime_kind_str(signal.regime))
        .bind(signal.votes_buy)
        .bind(signal.votes_sell)
        .bind(reasons)
        .bind(signal.executed as i32)
        .bind(&signal.block_reason)
        .bind(signal.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let engine_err = EngineError::from(err);
                if engine_err.is_idempotent_conflict() {
                    Ok(())
                } else {
                    Err(engine_err)
                }
            }
        }
    }

    pub async fn save_portfolio_state(&self, cash_balance: Decimal, total_equity: Decimal, realized_pnl_total: Decimal) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO portfolio_state (id, cash_balance, total_equity, realized_pnl_total, updated_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                cash_balance = excluded.cash_balance,
                total_equity = excluded.total_equity,
                realized_pnl_total = excluded.realized_pnl_total,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(cash_balance.to_string())
        .bind(total_equity.to_string())
        .bind(realized_pnl_total.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_portfolio_state(&self) -> EngineResult<Option<(Decimal, Decimal, Decimal)>> {
        let row = sqlx::query("SELECT cash_balance, total_equity, realized_pnl_total FROM portfolio_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some((
                decimal(row.get("cash_balance"))?,
                decimal(row.get("total_equity"))?,
                decimal(row.get("realized_pnl_total"))?,
            ))),
            None => Ok(None),
        }
    }

    pub async fn save_regime_state(&self, state: &RegimeState) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO regime_state (symbol, current_regime, entered_regime_at, candles_in_regime)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                current_regime = excluded.current_regime,
                entered_regime_at = excluded.entered_regime_at,
                candles_in_regime = excluded.candles_in_regime
            "#,
        )
        .bind(state.symbol.as_str())
        .bind(regime_kind_str(state.current_regime))
        .bind(state.entered_regime_at.to_rfc3339())
        .bind(state.candles_in_regime)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_regime_state(&self, symbol: TradingPair) -> EngineResult<Option<RegimeState>> {
        let row = sqlx::query("SELECT symbol, current_regime, entered_regime_at, candles_in_regime FROM regime_state WHERE symbol = ?")
            .bind(symbol.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(RegimeState {
                symbol,
                current_regime: parse_regime_kind(row.get("current_regime"))?,
                entered_regime_at: parse_timestamp(row.get("entered_regime_at"))?,
                candles_in_regime: row.get::<i64, _>("candles_in_regime") as u32,
            })),
            None => Ok(None),
        }
    }
}

fn decimal(raw: &str) -> EngineResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| EngineError::InvariantViolation(format!("corrupt decimal column: {e}")))
}

fn optional_decimal(raw: Option<&str>) -> Option<Decimal> {
    raw.and_then(|s| Decimal::from_str(s).ok())
}

fn parse_timestamp(raw: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::InvariantViolation(format!("corrupt timestamp column: {e}")))
}

fn parse_trading_pair(raw: &str) -> EngineResult<TradingPair> {
    TradingPair::from_str(raw).ok_or_else(|| EngineError::InvariantViolation(format!("unknown trading pair: {raw}")))
}

fn parse_side(raw: &str) -> EngineResult<Side> {
    match raw {
        "Buy" => Ok(Side::Buy),
        "Sell" => Ok(Side::Sell),
        other => Err(EngineError::InvariantViolation(format!("unknown side: {other}"))),
    }
}

fn entry_mode_str(mode: EntryMode) -> &'static str {
    match mode {
        EntryMode::MeanReversion => "MEAN_REVERSION",
        EntryMode::TrendFollowing => "TREND_FOLLOWING",
        EntryMode::Transition => "TRANSITION",
    }
}

fn parse_entry_mode(raw: &str) -> EngineResult<EntryMode> {
    match raw {
        "MEAN_REVERSION" => Ok(EntryMode::MeanReversion),
        "TREND_FOLLOWING" => Ok(EntryMode::TrendFollowing),
        "TRANSITION" => Ok(EntryMode::Transition),
        other => Err(EngineError::InvariantViolation(format!("unknown entry mode: {other}"))),
    }
}

fn regime_kind_str(kind: RegimeKind) -> &'static str {
    match kind {
        RegimeKind::MeanReversion => "MEAN_REVERSION",
        RegimeKind::TrendFollowing => "TREND_FOLLOWING",
        RegimeKind::Transition => "TRANSITION",
    }
}

fn parse_regime_kind(raw: &str) -> EngineResult<RegimeKind> {
    match raw {
        "MEAN_REVERSION" => Ok(RegimeKind::MeanReversion),
        "TREND_FOLLOWING" => Ok(RegimeKind::TrendFollowing),
        "TRANSITION" => Ok(RegimeKind::Transition),
        other => Err(EngineError::InvariantViolation(format!("unknown regime kind: {other}"))),
    }
}

fn decision_kind_str(kind: DecisionKind) -> &'static str {
    match kind {
        DecisionKind::Buy => "BUY",
        DecisionKind::Sell => "SELL",
        DecisionKind::Hold => "HOLD",
    }
}

fn parse_exit_reason(raw: &str) -> EngineResult<ExitReason> {
    match raw {
        "STOP_LOSS" => Ok(ExitReason::StopLoss),
        "BREAKEVEN" => Ok(ExitReason::Breakeven),
        "TRAILING_STOP" => Ok(ExitReason::TrailingStop),
        "PARTIAL_TAKE_PROFIT" => Ok(ExitReason::PartialTakeProfit),
        "TAKE_PROFIT" => Ok(ExitReason::TakeProfit),
        "SIGNAL_EXIT" => Ok(ExitReason::SignalExit),
        "LIQUIDATION" => Ok(ExitReason::Liquidation),
        other => Err(EngineError::InvariantViolation(format!("unknown exit reason: {other}"))),
    }
}

fn exit_reason_str(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::StopLoss => "STOP_LOSS",
        ExitReason::Breakeven => "BREAKEVEN",
        ExitReason::TrailingStop => "TRAILING_STOP",
        ExitReason::PartialTakeProfit => "PARTIAL_TAKE_PROFIT",
        ExitReason::TakeProfit => "TAKE_PROFIT",
        ExitReason::SignalExit => "SIGNAL_EXIT",
        ExitReason::Liquidation => "LIQUIDATION",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryMode, Side};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    async fn in_memory_ledger() -> PortfolioLedger {
        PortfolioLedger::new(":memory:").await.unwrap()
    }

    fn sample_trade(candle_open_time: DateTime<Utc>, reason: ExitReason) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4().to_string(),
            position_id: "pos-1".to_string(),
            symbol: TradingPair::BTCUSDT,
            side: Side::Buy,
            entry_price: dec!(100),
            exit_price: dec!(110),
            quantity: dec!(1),
            realized_pnl: dec!(10),
            commission_paid: dec!(0.2),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
            candle_open_time,
            reason,
            entry_mode: EntryMode::TrendFollowing,
        }
    }

    #[tokio::test]
    async fn replaying_the_same_trade_is_a_silent_no_op() {
        let ledger = in_memory_ledger().await;
        let candle_time = Utc::now();
        let trade = sample_trade(candle_time, ExitReason::TakeProfit);

        ledger.record_trade(&trade).await.unwrap();
        // Same symbol/candle/reason, different id — simulates a restart
        // replaying the same closed candle.
        let mut replay = sample_trade(candle_time, ExitReason::TakeProfit);
        replay.id = Uuid::new_v4().to_string();
        ledger.record_trade(&replay).await.unwrap();

        let stats = ledger.recent_trade_statistics(TradingPair::BTCUSDT, 10).await.unwrap();
        assert_eq!(stats.total_trades(), 1);
    }

    #[tokio::test]
    async fn distinct_exit_reasons_on_the_same_candle_both_record() {
        let ledger = in_memory_ledger().await;
        let candle_time = Utc::now();
        ledger.record_trade(&sample_trade(candle_time, ExitReason::PartialTakeProfit)).await.unwrap();
        ledger.record_trade(&sample_trade(candle_time, ExitReason::StopLoss)).await.unwrap();

        let stats = ledger.recent_trade_statistics(TradingPair::BTCUSDT, 10).await.unwrap();
        assert_eq!(stats.total_trades(), 2);
    }

    #[tokio::test]
    async fn removed_symbol_stays_in_history_but_goes_inactive() {
        let ledger = in_memory_ledger().await;
        ledger.add_symbol(TradingPair::ETHUSDT).await.unwrap();
        ledger.remove_symbol(TradingPair::ETHUSDT).await.unwrap();

        let tracked = ledger.get_tracked_symbols().await.unwrap();
        assert_eq!(tracked.len(), 1);
        assert!(!tracked[0].active);
    }

    #[tokio::test]
    async fn portfolio_state_round_trips() {
        let ledger = in_memory_ledger().await;
        ledger.save_portfolio_state(dec!(900), dec!(1000), dec!(50)).await.unwrap();
        let loaded = ledger.load_portfolio_state().await.unwrap().unwrap();
        assert_eq!(loaded.0, dec!(900));
        assert_eq!(loaded.1, dec!(1000));
    }
}
