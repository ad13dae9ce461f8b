#![allow(dead_code)]
pub mod binance;

pub use binance::*;

use async_trait::async_trait;
use rust_decimal::Decimal;
use crate::types::{Candle, Order, OrderRequest, Ticker, TimeFrame, TradingPair};

#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_ticker(&self, pair: TradingPair) -> anyhow::Result<Ticker>;
    async fn get_candles(&self, pair: TradingPair, timeframe: TimeFrame, limit: u32) -> anyhow::Result<Vec<Candle>>;
    async fn place_order(&self, request: OrderRequest) -> anyhow::Result<Order>;
    async fn cancel_order(&self, pair: TradingPair, order_id: &str) -> anyhow::Result<()>;
    async fn get_order(&self, pair: TradingPair, order_id: &str) -> anyhow::Result<Order>;
    async fn get_balance(&self, asset: &str) -> anyhow::Result<Decimal>;
    async fn get_server_time(&self) -> anyhow::Result<u64>;
}

#[async_trait]
impl Exchange for binance::BinanceClient {
    async fn get_ticker(&self, pair: TradingPair) -> anyhow::Result<Ticker> {
        BinanceClient::get_ticker(self, pair).await
    }

    async fn get_candles(&self, pair: TradingPair, timeframe: TimeFrame, limit: u32) -> anyhow::Result<Vec<Candle>> {
        BinanceClient::get_candles(self, pair, timeframe, limit).await
    }

    async fn place_order(&self, request: OrderRequest) -> anyhow::Result<Order> {
        BinanceClient::place_order(self, &request).await
    }

    async fn cancel_order(&self, pair: TradingPair, order_id: &str) -> anyhow::Result<()> {
        BinanceClient::cancel_order(self, pair, order_id).await
    }

    async fn get_order(&self, pair: TradingPair, order_id: &str) -> anyhow::Result<Order> {
        BinanceClient::get_order(self, pair, order_id).await
    }

    async fn get_balance(&self, asset: &str) -> anyhow::Result<Decimal> {
        BinanceClient::get_balance(self, asset).await
    }

    async fn get_server_time(&self) -> anyhow::Result<u64> {
        BinanceClient::get_server_time(self).await
    }
}
