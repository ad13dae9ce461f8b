use std::str::FromStr;
use std::sync::Arc;

use clap::Subcommand;
use rust_decimal::Decimal;

use crate::error::{EngineError, EngineResult};
use crate::scheduler::Scheduler;
use crate::types::TradingPair;

/// Stand-in for the chat bot's command surface (`add`, `remove`, `list`,
/// `status`, ...). A real chat backend would parse free text into one of
/// these variants before handing it to a [`ControlSurface`]; this enum lets
/// the same dispatch path be driven from the local binary for manual
/// testing.
#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Start tracking a symbol
    Add { symbol: String },
    /// Stop tracking a symbol (history is kept)
    Remove { symbol: String },
    /// List currently tracked symbols
    List,
    /// Scheduler run state and open position count
    Status,
    /// Cash, equity and realized P&L
    Balance,
    /// Most recent closed trades
    Trades {
        #[arg(default_value_t = 10)]
        n: usize,
    },
    /// Resume worker ticks
    Start,
    /// Halt worker ticks
    Stop,
    /// Stop then immediately restart
    Reset,
    /// Bypass the vote threshold and entry filters for one buy
    ForceBuy { symbol: String },
    /// Win/loss breakdown across all tracked symbols
    SignalStats,
    /// Current regime/vote snapshot for one symbol
    SignalAnalysis { symbol: String },
}

/// Chat commands are serialized through the ledger rather than touching
/// scheduler state directly, so `add`/`remove`/`force_buy` issued here are
/// indistinguishable from ones a real chat backend would send.
#[async_trait::async_trait]
pub trait ControlSurface: Send + Sync {
    async fn dispatch(&self, caller_id: &str, command: CliCommand) -> EngineResult<String>;
}

pub struct SchedulerControlSurface {
    scheduler: Arc<Scheduler>,
    owner_id: String,
}

impl SchedulerControlSurface {
    pub fn new(scheduler: Arc<Scheduler>, owner_id: String) -> Self {
        Self { scheduler, owner_id }
    }

    fn parse_symbol(raw: &str) -> EngineResult<TradingPair> {
        TradingPair::from_str(raw).ok_or_else(|| EngineError::ChatInput(format!("unknown symbol: {raw}")))
    }
}

#[async_trait::async_trait]
impl ControlSurface for SchedulerControlSurface {
    async fn dispatch(&self, caller_id: &str, command: CliCommand) -> EngineResult<String> {
        if caller_id != self.owner_id {
            return Err(EngineError::ChatInput(format!("{caller_id} is not authorized to issue commands")));
        }

        match command {
            CliCommand::Add { symbol } => {
                let pair = Self::parse_symbol(&symbol)?;
                self.scheduler.ledger().add_symbol(pair).await?;
                Ok(format!("tracking {pair}"))
            }
            CliCommand::Remove { symbol } => {
                let pair = Self::parse_symbol(&symbol)?;
                self.scheduler.ledger().remove_symbol(pair).await?;
                Ok(format!("stopped tracking {pair}"))
            }
            CliCommand::List => {
                let tracked = self.scheduler.ledger().get_tracked_symbols().await?;
                let active: Vec<String> = tracked.iter().filter(|s| s.active).map(|s| s.symbol.to_string()).collect();
                Ok(if active.is_empty() { "no tracked symbols".to_string() } else { active.join(", ") })
            }
            CliCommand::Status => {
                let status = self.scheduler.controller().status();
                let open = self.scheduler.ledger().get_open_positions().await?;
                Ok(format!("scheduler: {status:?}, open positions: {}", open.len()))
            }
            CliCommand::Balance => {
                let (cash, equity, realized) = self
                    .scheduler
                    .ledger()
                    .load_portfolio_state()
                    .await?
                    .unwrap_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));
                Ok(format!("cash: {cash}, equity: {equity}, realized_pnl: {realized}"))
            }
            CliCommand::Trades { n } => {
                let trades = self.scheduler.ledger().get_closed_trades(None, n).await?;
                if trades.is_empty() {
                    Ok("no closed trades".to_string())
                } else {
                    Ok(trades
                        .iter()
                        .map(|t| format!("{} {:?} qty={} pnl={}", t.symbol, t.reason, t.quantity, t.realized_pnl))
                        .collect::<Vec<_>>()
                        .join("\n"))
                }
            }
            CliCommand::Start => {
                self.scheduler.controller().start().map_err(EngineError::ChatInput)?;
                Ok("scheduler started".to_string())
            }
            CliCommand::Stop => {
                self.scheduler.controller().stop().map_err(EngineError::ChatInput)?;
                Ok("scheduler stopped".to_string())
            }
            CliCommand::Reset => {
                self.scheduler.controller().stop().ok();
                self.scheduler.controller().start().map_err(EngineError::ChatInput)?;
                Ok("scheduler reset".to_string())
            }
            CliCommand::ForceBuy { symbol } => {
                let pair = Self::parse_symbol(&symbol)?;
                self.scheduler.force_buy(pair).await?;
                Ok(format!("force_buy submitted for {pair}"))
            }
            CliCommand::SignalStats => {
                let tracked = self.scheduler.ledger().get_tracked_symbols().await?;
                let mut lines = Vec::new();
                for t in tracked.iter().filter(|s| s.active) {
                    let stats = self.scheduler.ledger().recent_trade_statistics(t.symbol, 50).await?;
                    lines.push(format!(
                        "{}: wins={} losses={} avg_win={:.2}% avg_loss={:.2}%",
                        t.symbol, stats.win_count, stats.loss_count, stats.avg_win_pct, stats.avg_loss_pct
                    ));
                }
                Ok(if lines.is_empty() { "no tracked symbols".to_string() } else { lines.join("\n") })
            }
            CliCommand::SignalAnalysis { symbol } => {
                let pair = Self::parse_symbol(&symbol)?;
                let decision = self.scheduler.signal_analysis(pair).await?;
                Ok(format!(
                    "{}: {:?} regime={:?} votes(buy={},sell={}) reasons=[{}]",
                    pair,
                    decision.kind,
                    decision.regime,
                    decision.votes.buy_votes,
                    decision.votes.sell_votes,
                    decision.reasons.join(", ")
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfigManager;
    use crate::exchange::BinanceClient;
    use crate::ledger::PortfolioLedger;
    use crate::notifications::NotificationManager;

    async fn surface() -> SchedulerControlSurface {
        let ledger = Arc::new(PortfolioLedger::new(":memory:").await.unwrap());
        let config = RuntimeConfigManager::new(crate::config::RuntimeConfig::default());
        let exchange: Arc<dyn crate::exchange::Exchange> = Arc::new(BinanceClient::public_only());
        let notifier: Arc<dyn crate::notifications::NotificationSink> = Arc::new(NotificationManager::new());
        let scheduler = Arc::new(Scheduler::new(exchange, ledger, config, notifier));
        SchedulerControlSurface::new(scheduler, "owner".to_string())
    }

    #[tokio::test]
    async fn unauthorized_caller_is_refused() {
        let surface = surface().await;
        let result = surface.dispatch("intruder", CliCommand::List).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn add_then_list_reflects_the_new_symbol() {
        let surface = surface().await;
        surface.dispatch("owner", CliCommand::Add { symbol: "ETHUSDT".to_string() }).await.unwrap();
        let listed = surface.dispatch("owner", CliCommand::List).await.unwrap();
        assert!(listed.contains("ETHUSDT"));
    }

    #[tokio::test]
    async fn remove_drops_symbol_from_list() {
        let surface = surface().await;
        surface.dispatch("owner", CliCommand::Add { symbol: "ETHUSDT".to_string() }).await.unwrap();
        surface.dispatch("owner", CliCommand::Remove { symbol: "ETHUSDT".to_string() }).await.unwrap();
        let listed = surface.dispatch("owner", CliCommand::List).await.unwrap();
        assert!(!listed.contains("ETHUSDT"));
    }

    #[tokio::test]
    async fn unknown_symbol_is_rejected_before_touching_the_ledger() {
        let surface = surface().await;
        let result = surface.dispatch("owner", CliCommand::Add { symbol: "NOTAPAIR".to_string() }).await;
        assert!(result.is_err());
    }
}
