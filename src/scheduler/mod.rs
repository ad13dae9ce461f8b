use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RuntimeConfigManager;
use crate::error::{EngineError, EngineResult};
use crate::exchange::Exchange;
use crate::indicators::snapshot::{IndicatorPeriods, IndicatorSnapshot, SymbolIndicators};
use crate::ledger::PortfolioLedger;
use crate::notifications::{AlertType, NotificationSink};
use crate::position_manager::{evaluate_position, PositionAction};
use crate::regime::RegimeSelector;
use crate::signal::{generate_signal, EntryFilterInputs, SignalDecision};
use crate::sizing::{recommend_size, size_to_quantity};
use crate::types::{
    Candle, DecisionKind, EntryMode, ExitReason, Order, OrderRequest, Position, RegimeKind, Side,
    SignalRecord, TradeRecord, TradingPair,
};

/// How often a worker polls its symbol for a new closed candle, independent
/// of the symbol's own timeframe. The scheduler debounces on candle
/// `open_time`, so polling faster than the timeframe just means the worker
/// usually finds nothing new to do.
const POLL_GRANULARITY: Duration = Duration::from_secs(30);

/// Maximum symbols with an in-flight exchange fetch at once.
const MAX_CONCURRENT_FETCHES: usize = 8;

const FETCH_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Running,
    Paused,
    Stopped,
}

/// Run/pause/stop state machine for the symbol workers. Workers check
/// `should_process()` at the top of every tick rather than being killed and
/// respawned, so pausing never drops an in-flight ledger commit.
pub struct SchedulerController {
    running: AtomicBool,
    paused: AtomicBool,
    status_tx: broadcast::Sender<SchedulerStatus>,
}

impl SchedulerController {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(32);
        Self {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            status_tx,
        }
    }

    pub fn start(&self) -> Result<(), String> {
        if self.running.load(Ordering::Acquire) && !self.paused.load(Ordering::Acquire) {
            return Err("scheduler is already running".to_string());
        }
        self.running.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        let _ = self.status_tx.send(SchedulerStatus::Running);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), String> {
        if !self.running.load(Ordering::Acquire) {
            return Err("scheduler is not running".to_string());
        }
        self.running.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        let _ = self.status_tx.send(SchedulerStatus::Stopped);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), String> {
        if !self.running.load(Ordering::Acquire) {
            return Err("scheduler is not running".to_string());
        }
        self.paused.store(true, Ordering::Release);
        let _ = self.status_tx.send(SchedulerStatus::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), String> {
        if !self.running.load(Ordering::Acquire) {
            return Err("scheduler is not running".to_string());
        }
        self.paused.store(false, Ordering::Release);
        let _ = self.status_tx.send(SchedulerStatus::Running);
        Ok(())
    }

    pub fn should_process(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.paused.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SchedulerStatus {
        if !self.running.load(Ordering::Acquire) {
            SchedulerStatus::Stopped
        } else if self.paused.load(Ordering::Acquire) {
            SchedulerStatus::Paused
        } else {
            SchedulerStatus::Running
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }
}

impl Default for SchedulerController {
    fn default() -> Self {
        Self::new()
    }
}

/// Ties the indicator pipeline, regime selector, signal generator, sizer and
/// position manager to a durable ledger and a live exchange, polling each
/// tracked symbol on its own cadence with bounded concurrency.
pub struct Scheduler {
    exchange: Arc<dyn Exchange>,
    ledger: Arc<PortfolioLedger>,
    config: RuntimeConfigManager,
    notifier: Arc<dyn NotificationSink>,
    controller: SchedulerController,
    fetch_semaphore: Arc<Semaphore>,
    indicators: Mutex<HashMap<TradingPair, SymbolIndicators>>,
    regimes: Mutex<HashMap<TradingPair, RegimeSelector>>,
    last_candle_open_time: Mutex<HashMap<TradingPair, chrono::DateTime<Utc>>>,
    symbol_locks: Mutex<HashMap<TradingPair, Arc<Mutex<()>>>>,
}

impl Scheduler {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        ledger: Arc<PortfolioLedger>,
        config: RuntimeConfigManager,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            exchange,
            ledger,
            config,
            notifier,
            controller: SchedulerController::new(),
            fetch_semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)),
            indicators: Mutex::new(HashMap::new()),
            regimes: Mutex::new(HashMap::new()),
            last_candle_open_time: Mutex::new(HashMap::new()),
            symbol_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn controller(&self) -> &SchedulerController {
        &self.controller
    }

    pub fn ledger(&self) -> &Arc<PortfolioLedger> {
        &self.ledger
    }

    pub fn config_manager(&self) -> &RuntimeConfigManager {
        &self.config
    }

    /// Spawns one worker per currently-enabled symbol and blocks until all
    /// of them exit (which only happens on process shutdown). A symbol
    /// added later via a chat command is picked up by restarting the
    /// scheduler, not by this call.
    pub async fn run(self: Arc<Self>) {
        self.controller.start().ok();

        let mut tracked = self.ledger.get_tracked_symbols().await.unwrap_or_default();
        if tracked.is_empty() {
            // First run against a fresh ledger: seed from the static config
            // list so the bot has something to watch before any chat `add`
            // command has ever run.
            for pair_str in &self.config.get_config().await.general.enabled_pairs {
                if let Some(pair) = TradingPair::from_str(pair_str) {
                    if self.ledger.add_symbol(pair).await.is_ok() {
                        tracked.push(crate::types::TrackedSymbol {
                            symbol: pair,
                            active: true,
                            last_fetched_candle_open_time: None,
                        });
                    }
                }
            }
        }

        let pairs: Vec<TradingPair> = tracked.into_iter().filter(|s| s.active).map(|s| s.symbol).collect();

        let mut handles = Vec::new();
        for pair in pairs {
            let scheduler = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                scheduler.worker_loop(pair).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, symbol: TradingPair) {
        let mut ticker = tokio::time::interval(POLL_GRANULARITY);
        loop {
            ticker.tick().await;

            if !self.controller.should_process() {
                if self.controller.status() == SchedulerStatus::Stopped {
                    return;
                }
                continue;
            }

            if let Err(err) = self.process_symbol_tick(symbol).await {
                self.handle_tick_error(symbol, err).await;
            }
        }
    }

    async fn handle_tick_error(&self, symbol: TradingPair, err: EngineError) {
        match err {
            EngineError::TransientUpstream { .. } => {
                warn!(%symbol, error = %err, "transient upstream failure, retrying next tick");
            }
            EngineError::PermanentUpstream { reason, .. } => {
                error!(%symbol, reason, "permanent upstream failure, marking symbol inactive");
                self.notifier
                    .notify(AlertType::Error {
                        component: "scheduler".to_string(),
                        message: format!("{symbol} marked inactive: {reason}"),
                    })
                    .await;
            }
            EngineError::InvariantViolation(reason) => {
                error!(%symbol, reason, "invariant violation, rolling back this tick");
                self.notifier
                    .notify(AlertType::Error {
                        component: "position_manager".to_string(),
                        message: reason,
                    })
                    .await;
            }
            other => {
                error!(%symbol, error = %other, "unhandled error processing symbol tick");
            }
        }
    }

    /// Applies a cash/realized-pnl delta to the persisted portfolio totals.
    /// `total_equity` is tracked as cash only — open-position mark-to-market
    /// is recomputed by the caller when it needs a full equity figure, this
    /// just keeps the ledger's running cash/realized-pnl columns correct
    /// across opens, closes and averaging fills.
    async fn adjust_portfolio_cash(&self, cash_delta: Decimal, realized_pnl_delta: Decimal) -> EngineResult<()> {
        let (cash_balance, _, realized_pnl_total) = self
            .ledger
            .load_portfolio_state()
            .await?
            .unwrap_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));
        let new_cash = cash_balance + cash_delta;
        let new_realized = realized_pnl_total + realized_pnl_delta;
        self.ledger.save_portfolio_state(new_cash, new_cash, new_realized).await
    }

    async fn symbol_lock(&self, symbol: TradingPair) -> Arc<Mutex<()>> {
        let mut locks = self.symbol_locks.lock().await;
        Arc::clone(locks.entry(symbol).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    async fn fetch_candles(&self, symbol: TradingPair) -> EngineResult<Vec<Candle>> {
        let _permit = self.fetch_semaphore.acquire().await.map_err(|_| {
            EngineError::Other(anyhow::anyhow!("fetch semaphore closed"))
        })?;

        let config = self.config.get_config().await;
        let timeframe = timeframe_from_str(&config.general.timeframe);

        tokio::time::timeout(FETCH_DEADLINE, self.exchange.get_candles(symbol, timeframe, 300))
            .await
            .map_err(|_| EngineError::TransientUpstream {
                symbol: symbol.as_str().to_string(),
                source: anyhow::anyhow!("fetch deadline exceeded"),
            })?
            .map_err(|source| EngineError::TransientUpstream {
                symbol: symbol.as_str().to_string(),
                source,
            })
    }

    /// Runs the full pipeline for one symbol if a new closed candle is
    /// available: indicator update, regime update, signal generation, exit
    /// evaluation or new-entry evaluation, and the resulting ledger writes.
    pub async fn process_symbol_tick(&self, symbol: TradingPair) -> EngineResult<()> {
        let candles = self.fetch_candles(symbol).await?;
        let candle = match candles.iter().rev().find(|c| c.is_closed) {
            Some(c) => c.clone(),
            None => return Ok(()),
        };

        {
            let mut last = self.last_candle_open_time.lock().await;
            if last.get(&symbol) == Some(&candle.open_time) {
                return Ok(());
            }
            last.insert(symbol, candle.open_time);
        }

        let config = self.config.get_config().await;

        let snapshot = {
            let mut indicators = self.indicators.lock().await;
            let symbol_indicators = indicators
                .entry(symbol)
                .or_insert_with(|| SymbolIndicators::new(IndicatorPeriods::default()));
            symbol_indicators.update(&candle)
        };
        let snapshot = match snapshot {
            Some(s) => s,
            // Fewer than warm-up candles: HOLD regardless of votes.
            None => return Ok(()),
        };

        let regime = {
            let mut regimes = self.regimes.lock().await;
            let selector = regimes.entry(symbol).or_insert_with(|| RegimeSelector::new(symbol));
            let previous = selector.state().current_regime;
            let kind = selector.update(&snapshot, &config.regime, candle.open_time);
            self.ledger.save_regime_state(selector.state()).await?;
            if kind != previous && kind != RegimeKind::Transition {
                self.notifier
                    .notify(AlertType::RegimeSwitch {
                        pair: symbol,
                        from: format!("{previous:?}"),
                        to: format!("{kind:?}"),
                    })
                    .await;
            }
            kind
        };

        let lock = self.symbol_lock(symbol).await;
        let _guard = lock.lock().await;

        let open_positions = self.ledger.get_open_positions().await?;
        let existing = open_positions.into_iter().find(|p| p.pair == symbol);

        let mut decision = generate_signal(&snapshot, regime, &config, &EntryFilterInputs { force_buy: false });

        match existing {
            Some(mut position) => {
                position.update_price(snapshot.close);
                self.evaluate_and_apply(&mut position, &decision, &candle, &config).await?;
            }
            None => {
                if decision.kind == DecisionKind::Buy {
                    if let Some(reason) =
                        self.try_open_position(symbol, &snapshot, &decision, regime, &candle, &config).await?
                    {
                        decision.block_reason = Some(reason.to_string());
                    }
                }
            }
        }

        self.record_signal(symbol, &decision, &candle).await?;

        Ok(())
    }

    async fn record_signal(&self, symbol: TradingPair, decision: &SignalDecision, candle: &Candle) -> EngineResult<()> {
        let record = SignalRecord {
            id: Uuid::new_v4().to_string(),
            symbol,
            candle_open_time: candle.open_time,
            decision: decision.kind,
            regime: decision.regime,
            votes_buy: decision.votes.buy_votes,
            votes_sell: decision.votes.sell_votes,
            reasons: decision.reasons.clone(),
            executed: decision.kind != DecisionKind::Hold,
            block_reason: decision.block_reason.clone(),
            created_at: Utc::now(),
        };
        self.ledger.record_signal(&record).await
    }

    async fn evaluate_and_apply(
        &self,
        position: &mut Position,
        decision: &SignalDecision,
        candle: &Candle,
        config: &crate::config::RuntimeConfig,
    ) -> EngineResult<()> {
        let action = evaluate_position(position, Some(&decision.kind), config);

        match action {
            PositionAction::None => {
                self.ledger.upsert_position(position).await?;
            }
            PositionAction::Close { reason } => {
                self.close_position(position, reason, candle, config).await?;
            }
            PositionAction::ClosePartial { fraction, reason } => {
                self.close_partial(position, fraction, reason, candle, config).await?;
            }
            PositionAction::ActivateTrailing { new_stop } => {
                position.trailing_active = true;
                position.stop_loss = Some(new_stop);
                self.ledger.upsert_position(position).await?;
                self.notifier
                    .notify(AlertType::TrailingStopActivated {
                        pair: position.pair,
                        activation_price: position.current_price.to_string(),
                        trail_level: new_stop.to_string(),
                    })
                    .await;
            }
            PositionAction::UpdateTrailingStop { new_stop } => {
                position.stop_loss = Some(new_stop);
                self.ledger.upsert_position(position).await?;
            }
            PositionAction::Average { mode, quantity } => {
                self.apply_averaging(position, mode, quantity, config).await?;
            }
        }

        Ok(())
    }

    async fn close_position(
        &self,
        position: &mut Position,
        reason: ExitReason,
        candle: &Candle,
        config: &crate::config::RuntimeConfig,
    ) -> EngineResult<()> {
        let order = self.submit_market_order(position.pair, position.side.opposite(), position.quantity).await?;
        let exit_price = order.average_fill_price.unwrap_or(position.current_price);
        let filled_qty = if order.filled_quantity.is_zero() { position.quantity } else { order.filled_quantity };
        let commission = filled_qty * exit_price * config.risk.commission_rate;

        position.quantity = filled_qty;
        position.close(exit_price);
        position.commission_paid += commission;
        position.realized_pnl -= commission;

        self.ledger.upsert_position(position).await?;
        self.adjust_portfolio_cash(filled_qty * exit_price - commission, position.realized_pnl).await?;

        let trade = TradeRecord {
            id: Uuid::new_v4().to_string(),
            position_id: position.id.clone(),
            symbol: position.pair,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: filled_qty,
            realized_pnl: position.realized_pnl,
            commission_paid: commission,
            opened_at: position.opened_at,
            closed_at: position.closed_at.unwrap_or_else(Utc::now),
            candle_open_time: candle.open_time,
            reason,
            entry_mode: position.entry_mode,
        };
        self.ledger.record_trade(&trade).await?;

        if reason == ExitReason::Breakeven {
            self.notifier
                .notify(AlertType::BreakEvenStopSet {
                    pair: position.pair,
                    entry_price: position.entry_price.to_string(),
                })
                .await;
        }

        self.notifier
            .notify(AlertType::PositionClosed {
                pair: position.pair,
                pnl: position.realized_pnl.to_string(),
                pnl_pct: position.pnl_percentage().to_string(),
                reason: format!("{reason:?}"),
            })
            .await;

        Ok(())
    }

    async fn close_partial(
        &self,
        position: &mut Position,
        fraction: Decimal,
        reason: ExitReason,
        candle: &Candle,
        config: &crate::config::RuntimeConfig,
    ) -> EngineResult<()> {
        let qty_to_close = position.quantity * fraction;
        let order = self.submit_market_order(position.pair, position.side.opposite(), qty_to_close).await?;
        let exit_price = order.average_fill_price.unwrap_or(position.current_price);
        let filled_qty = if order.filled_quantity.is_zero() { qty_to_close } else { order.filled_quantity };
        let commission = filled_qty * exit_price * config.risk.commission_rate;

        let realized = position.calculate_pnl(exit_price) * (filled_qty / position.quantity) - commission;

        position.quantity -= filled_qty;
        position.realized_pnl += realized;
        position.commission_paid += commission;
        position.partial_tp_taken = true;
        position.breakeven_active = true;
        position.stop_loss = Some(position.entry_price);

        self.ledger.upsert_position(position).await?;
        self.adjust_portfolio_cash(filled_qty * exit_price - commission, realized).await?;

        let trade = TradeRecord {
            id: Uuid::new_v4().to_string(),
            position_id: position.id.clone(),
            symbol: position.pair,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: filled_qty,
            realized_pnl: realized,
            commission_paid: commission,
            opened_at: position.opened_at,
            closed_at: Utc::now(),
            candle_open_time: candle.open_time,
            reason,
            entry_mode: position.entry_mode,
        };
        self.ledger.record_trade(&trade).await?;

        self.notifier
            .notify(AlertType::PartialExitExecuted {
                pair: position.pair,
                quantity: filled_qty.to_string(),
                pnl: realized.to_string(),
                reason: format!("{reason:?}"),
            })
            .await;

        Ok(())
    }

    async fn apply_averaging(
        &self,
        position: &mut Position,
        mode: crate::types::AveragingMode,
        quantity: Decimal,
        config: &crate::config::RuntimeConfig,
    ) -> EngineResult<()> {
        let side = position.side;
        let order = self.submit_market_order(position.pair, side, quantity).await?;
        let fill_price = order.average_fill_price.unwrap_or(position.current_price);
        let filled_qty = if order.filled_quantity.is_zero() { quantity } else { order.filled_quantity };
        let commission = filled_qty * fill_price * config.risk.commission_rate;

        position.apply_averaging(fill_price, filled_qty, mode, commission);
        self.ledger.upsert_position(position).await?;
        self.adjust_portfolio_cash(-(filled_qty * fill_price + commission), Decimal::ZERO).await?;

        let alert = match mode {
            crate::types::AveragingMode::AverageDown => AlertType::AverageDown {
                pair: position.pair,
                added_quantity: filled_qty.to_string(),
                new_avg_entry: position.entry_price.to_string(),
            },
            crate::types::AveragingMode::PyramidUp => AlertType::PyramidUp {
                pair: position.pair,
                added_quantity: filled_qty.to_string(),
                new_avg_entry: position.entry_price.to_string(),
            },
        };
        self.notifier.notify(alert).await;

        Ok(())
    }

    /// Returns `Ok(Some(reason))` when the open was blocked by a portfolio
    /// invariant rather than the signal itself, so the caller can record why
    /// an otherwise-qualifying BUY never became a position.
    async fn try_open_position(
        &self,
        symbol: TradingPair,
        snapshot: &IndicatorSnapshot,
        decision: &SignalDecision,
        regime: RegimeKind,
        candle: &Candle,
        config: &crate::config::RuntimeConfig,
    ) -> EngineResult<Option<&'static str>> {
        self.try_open_position_inner(symbol, snapshot, decision, regime, candle, config, false).await
    }

    /// `force` bypasses the vote threshold and entry filters (already
    /// applied by the caller for a chat-issued `force_buy`) but never
    /// bypasses `MAX_POSITIONS` or the cash check — those are portfolio
    /// invariants, not signal-quality filters.
    async fn try_open_position_inner(
        &self,
        symbol: TradingPair,
        snapshot: &IndicatorSnapshot,
        decision: &SignalDecision,
        regime: RegimeKind,
        candle: &Candle,
        config: &crate::config::RuntimeConfig,
        force: bool,
    ) -> EngineResult<Option<&'static str>> {
        let open_positions = self.ledger.get_open_positions().await?;
        if open_positions.len() >= config.risk.max_positions {
            info!(%symbol, "blocked: position_limit");
            return Ok(Some("position_limit"));
        }

        let (cash_balance, _, _) = self
            .ledger
            .load_portfolio_state()
            .await?
            .unwrap_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));

        let stats = self
            .ledger
            .recent_trade_statistics(symbol, config.sizing.kelly_lookback_trades)
            .await?;
        let size = recommend_size(&stats, &config.sizing);

        let quantity = match size_to_quantity(cash_balance, size.fraction_of_capital, snapshot.close, symbol.min_notional()) {
            Some(q) => q,
            None => {
                info!(%symbol, "blocked: below min notional or insufficient cash");
                return Ok(Some("insufficient_cash"));
            }
        };

        let order = self.submit_market_order(symbol, Side::Buy, quantity).await?;
        let fill_price = order.average_fill_price.unwrap_or(snapshot.close);
        let filled_qty = if order.filled_quantity.is_zero() { quantity } else { order.filled_quantity };
        let commission = filled_qty * fill_price * config.risk.commission_rate;

        let entry_mode = match regime {
            RegimeKind::MeanReversion => EntryMode::MeanReversion,
            RegimeKind::TrendFollowing => EntryMode::TrendFollowing,
            RegimeKind::Transition => EntryMode::Transition,
        };

        let mut reasons = decision.reasons.clone();
        if force {
            reasons.push("force_buy".to_string());
        }

        let mut position = Position::new(
            symbol,
            Side::Buy,
            fill_price,
            filled_qty,
            "regime-engine".to_string(),
            entry_mode,
            decision.votes.delta(),
            reasons,
            commission,
        );
        position.stop_loss = decision.proposed_stop_loss;
        position.take_profit = decision.proposed_take_profit;

        self.ledger.upsert_position(&position).await?;
        self.adjust_portfolio_cash(-(filled_qty * fill_price + commission), Decimal::ZERO).await?;

        self.notifier
            .notify(AlertType::PositionOpened {
                pair: symbol,
                side: Side::Buy.as_str().to_string(),
                quantity: filled_qty.to_string(),
                entry_price: fill_price.to_string(),
            })
            .await;

        let _ = candle;
        Ok(None)
    }

    async fn submit_market_order(&self, symbol: TradingPair, side: Side, quantity: Decimal) -> EngineResult<Order> {
        self.exchange
            .place_order(OrderRequest::market(symbol, side, quantity))
            .await
            .map_err(|source| EngineError::TransientUpstream {
                symbol: symbol.as_str().to_string(),
                source,
            })
    }

    /// Entry point for a chat-issued `force_buy`: still enforces
    /// `MAX_POSITIONS`/cash but skips the vote threshold and entry filters.
    pub async fn force_buy(&self, symbol: TradingPair) -> EngineResult<()> {
        let config = self.config.get_config().await;
        let regime = {
            let regimes = self.regimes.lock().await;
            regimes.get(&symbol).map(|r| r.state().current_regime).unwrap_or(RegimeKind::Transition)
        };
        let snapshot = {
            let indicators = self.indicators.lock().await;
            indicators.get(&symbol).and_then(|i| i.last_snapshot())
        };
        let snapshot = match snapshot {
            Some(s) => s,
            None => return Err(EngineError::ChatInput(format!("{symbol} has no warmed-up indicators yet"))),
        };

        let decision = generate_signal(&snapshot, regime, &config, &EntryFilterInputs { force_buy: true });
        let candle = Candle {
            pair: symbol,
            timeframe: timeframe_from_str(&config.general.timeframe),
            open_time: Utc::now(),
            close_time: Utc::now(),
            open: snapshot.close,
            high: snapshot.close,
            low: snapshot.close,
            close: snapshot.close,
            volume: snapshot.volume,
            quote_volume: snapshot.volume * snapshot.close,
            trades: 0,
            is_closed: true,
        };

        self.try_open_position_inner(symbol, &snapshot, &decision, regime, &candle, &config, true).await?;
        Ok(())
    }

    /// Read-only counterpart to [`Self::force_buy`]: reports what the
    /// pipeline would decide for a symbol's last warmed-up snapshot without
    /// submitting an order. Used by the `signal_analysis` chat command.
    pub async fn signal_analysis(&self, symbol: TradingPair) -> EngineResult<SignalDecision> {
        let config = self.config.get_config().await;
        let regime = {
            let regimes = self.regimes.lock().await;
            regimes.get(&symbol).map(|r| r.state().current_regime).unwrap_or(RegimeKind::Transition)
        };
        let snapshot = {
            let indicators = self.indicators.lock().await;
            indicators.get(&symbol).and_then(|i| i.last_snapshot())
        };
        let snapshot = match snapshot {
            Some(s) => s,
            None => return Err(EngineError::ChatInput(format!("{symbol} has no warmed-up indicators yet"))),
        };

        Ok(generate_signal(&snapshot, regime, &config, &EntryFilterInputs { force_buy: false }))
    }
}

fn timeframe_from_str(raw: &str) -> crate::types::TimeFrame {
    use crate::types::TimeFrame;
    match raw {
        "M1" | "1m" => TimeFrame::M1,
        "M5" | "5m" => TimeFrame::M5,
        "M15" | "15m" => TimeFrame::M15,
        "H4" | "4h" => TimeFrame::H4,
        "D1" | "1d" => TimeFrame::D1,
        _ => TimeFrame::H1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_refuses_pause_before_start() {
        let controller = SchedulerController::new();
        assert!(controller.pause().is_err());
    }

    #[test]
    fn controller_transitions_through_run_pause_resume_stop() {
        let controller = SchedulerController::new();
        controller.start().unwrap();
        assert_eq!(controller.status(), SchedulerStatus::Running);
        controller.pause().unwrap();
        assert_eq!(controller.status(), SchedulerStatus::Paused);
        assert!(!controller.should_process());
        controller.resume().unwrap();
        assert!(controller.should_process());
        controller.stop().unwrap();
        assert_eq!(controller.status(), SchedulerStatus::Stopped);
    }

    #[test]
    fn timeframe_parsing_falls_back_to_hourly() {
        assert_eq!(timeframe_from_str("bogus"), crate::types::TimeFrame::H1);
        assert_eq!(timeframe_from_str("M5"), crate::types::TimeFrame::M5);
    }
}
