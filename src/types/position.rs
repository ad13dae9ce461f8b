use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Side, TradingPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
    Liquidated,
}

/// Regime the position was opened under. Carried for the lifetime of the
/// position so the exit-priority protocol can apply regime-specific templates
/// (e.g. mean-reversion positions exit on mean-touch, trend positions trail).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryMode {
    MeanReversion,
    TrendFollowing,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AveragingMode {
    AverageDown,
    PyramidUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AveragingEntry {
    pub price: Decimal,
    pub quantity: Decimal,
    pub at: DateTime<Utc>,
    pub mode: AveragingMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub pair: TradingPair,
    pub side: Side,
    pub status: PositionStatus,
    /// Volume-weighted average of all fills, including averaging-in entries.
    /// Plain `entry_price` semantics: the initial fill's cost basis, before
    /// any averaging occurs, this equals the first fill price.
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    #[serde(default)]
    pub peak_pnl_pct: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub strategy_id: String,
    pub order_ids: Vec<String>,
    #[serde(default)]
    pub oco_order_id: Option<String>,

    /// Sum of (fill_price * fill_qty) across the initial entry and every
    /// averaging entry. `entry_price` is `total_invested / quantity`.
    #[serde(default)]
    pub total_invested: Decimal,
    #[serde(default)]
    pub commission_paid: Decimal,
    /// Running high-water mark since entry, used by the trailing-stop and
    /// trailing-activation steps instead of `peak_pnl_pct` so the trail
    /// distance is expressed in price, not percent-of-notional.
    #[serde(default)]
    pub highest_price_since_entry: Decimal,
    #[serde(default)]
    pub trailing_active: bool,
    #[serde(default)]
    pub breakeven_active: bool,
    #[serde(default)]
    pub partial_tp_taken: bool,

    pub entry_mode: EntryMode,
    /// Vote-count gap between BUY and SELL votes at entry, kept for
    /// post-trade diagnostics.
    #[serde(default)]
    pub entry_votes_delta: i32,
    #[serde(default)]
    pub entry_reasons: Vec<String>,

    #[serde(default)]
    pub averaging_count: u32,
    #[serde(default)]
    pub averaging_entries: Vec<AveragingEntry>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair: TradingPair,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        strategy_id: String,
        entry_mode: EntryMode,
        entry_votes_delta: i32,
        entry_reasons: Vec<String>,
        commission_paid: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pair,
            side,
            status: PositionStatus::Open,
            entry_price,
            current_price: entry_price,
            quantity,
            stop_loss: None,
            take_profit: None,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            peak_pnl_pct: Decimal::ZERO,
            opened_at: Utc::now(),
            closed_at: None,
            strategy_id,
            order_ids: Vec::new(),
            oco_order_id: None,
            total_invested: entry_price * quantity,
            commission_paid,
            highest_price_since_entry: entry_price,
            trailing_active: false,
            breakeven_active: false,
            partial_tp_taken: false,
            entry_mode,
            entry_votes_delta,
            entry_reasons,
            averaging_count: 0,
            averaging_entries: Vec::new(),
        }
    }

    pub fn update_price(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = self.calculate_pnl(price);
        let pnl_pct = self.pnl_percentage();
        if pnl_pct > self.peak_pnl_pct {
            self.peak_pnl_pct = pnl_pct;
        }
        match self.side {
            Side::Buy => {
                if price > self.highest_price_since_entry {
                    self.highest_price_since_entry = price;
                }
            }
            Side::Sell => {
                if self.highest_price_since_entry.is_zero() || price < self.highest_price_since_entry {
                    self.highest_price_since_entry = price;
                }
            }
        }
    }

    pub fn calculate_pnl(&self, price: Decimal) -> Decimal {
        let price_diff = price - self.entry_price;
        match self.side {
            Side::Buy => price_diff * self.quantity,
            Side::Sell => -price_diff * self.quantity,
        }
    }

    pub fn pnl_percentage(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let entry_value = self.entry_price * self.quantity;
        if entry_value.is_zero() {
            return Decimal::ZERO;
        }
        (self.unrealized_pnl / entry_value) * Decimal::from(100)
    }

    pub fn notional_value(&self) -> Decimal {
        self.current_price * self.quantity
    }

    pub fn entry_value(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    pub fn should_stop_loss(&self) -> bool {
        if let Some(sl) = self.stop_loss {
            match self.side {
                Side::Buy => self.current_price <= sl,
                Side::Sell => self.current_price >= sl,
            }
        } else {
            false
        }
    }

    pub fn should_take_profit(&self) -> bool {
        if let Some(tp) = self.take_profit {
            match self.side {
                Side::Buy => self.current_price >= tp,
                Side::Sell => self.current_price <= tp,
            }
        } else {
            false
        }
    }

    pub fn close(&mut self, exit_price: Decimal) {
        self.current_price = exit_price;
        self.realized_pnl = self.calculate_pnl(exit_price);
        self.unrealized_pnl = Decimal::ZERO;
        self.peak_pnl_pct = Decimal::ZERO;
        self.status = PositionStatus::Closed;
        self.closed_at = Some(Utc::now());
    }

    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn duration(&self) -> chrono::Duration {
        let end = self.closed_at.unwrap_or_else(Utc::now);
        end - self.opened_at
    }

    pub fn is_profitable(&self) -> bool {
        self.unrealized_pnl > Decimal::ZERO || self.realized_pnl > Decimal::ZERO
    }

    /// Folds an additional fill (AVERAGE_DOWN or PYRAMID_UP) into the
    /// position, recomputing the volume-weighted average entry price and
    /// quantity. The caller is responsible for checking
    /// `MAX_AVERAGING_ATTEMPTS` and `MAX_TOTAL_RISK_MULTIPLIER` before
    /// calling this.
    pub fn apply_averaging(&mut self, price: Decimal, quantity: Decimal, mode: AveragingMode, commission: Decimal) {
        self.total_invested += price * quantity;
        self.quantity += quantity;
        self.entry_price = self.total_invested / self.quantity;
        self.commission_paid += commission;
        self.averaging_count += 1;
        self.averaging_entries.push(AveragingEntry {
            price,
            quantity,
            at: Utc::now(),
            mode,
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_equity: Decimal,
    pub available_balance: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_realized_pnl: Decimal,
    pub positions: Vec<Position>,
    pub daily_pnl: Decimal,
    pub daily_pnl_percentage: Decimal,
}

impl PortfolioSnapshot {
    pub fn position_count(&self) -> usize {
        self.positions.iter().filter(|p| p.status == PositionStatus::Open).count()
    }

    pub fn total_position_value(&self) -> Decimal {
        self.positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.notional_value())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_position() -> Position {
        Position::new(
            TradingPair::BTCUSDT,
            Side::Buy,
            dec!(100),
            dec!(2),
            "regime-engine".to_string(),
            EntryMode::TrendFollowing,
            3,
            vec!["ema_cross".to_string()],
            dec!(0.2),
        )
    }

    #[test]
    fn averaging_down_recomputes_weighted_entry() {
        let mut pos = open_position();
        pos.apply_averaging(dec!(90), dec!(2), AveragingMode::AverageDown, dec!(0.18));
        // (100*2 + 90*2) / 4 = 95
        assert_eq!(pos.entry_price, dec!(95));
        assert_eq!(pos.quantity, dec!(4));
        assert_eq!(pos.averaging_count, 1);
    }

    #[test]
    fn highest_price_tracks_favorable_excursion_for_longs() {
        let mut pos = open_position();
        pos.update_price(dec!(110));
        pos.update_price(dec!(105));
        assert_eq!(pos.highest_price_since_entry, dec!(110));
    }
}
