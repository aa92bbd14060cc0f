//! Exchange Port
//!
//! Everything the run cycle needs from a perpetual-futures venue. All calls are
//! scoped to one symbol in the venue's unified notation (e.g. `BTC/USDT:USDT`).

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{BracketOrder, ExchangeOrder, PlacedOrder, Position};
use crate::ports::market_data::{Balance, Ohlcv, Timeframe};
use crate::strategy::params::{MarginMode, StopPriceType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Exchange API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to parse exchange response: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ExchangeError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        ExchangeError::Api {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Base-asset quantity represented by one contract
    async fn contract_size(&self, symbol: &str) -> Result<f64, ExchangeError>;

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError>;

    async fn cancel_order(&self, id: &str, symbol: &str) -> Result<(), ExchangeError>;

    async fn fetch_open_trigger_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError>;

    async fn cancel_trigger_order(&self, id: &str, symbol: &str) -> Result<(), ExchangeError>;

    /// Recently closed trigger orders, oldest first
    async fn fetch_closed_trigger_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError>;

    async fn fetch_open_positions(&self, symbol: &str) -> Result<Vec<Position>, ExchangeError>;

    /// Market-close the full size of `position`
    async fn close_position(&self, position: &Position) -> Result<(), ExchangeError>;

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<(), ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32, mode: MarginMode) -> Result<(), ExchangeError>;

    async fn fetch_balance(&self, currency: &str) -> Result<Balance, ExchangeError>;

    /// Smallest order size accepted, in contracts
    async fn fetch_min_amount_tradable(&self, symbol: &str) -> Result<f64, ExchangeError>;

    /// Most recent `limit` candles, oldest first; the last one may still be forming
    async fn fetch_recent_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, ExchangeError>;

    /// Trigger order that rests as a limit order at `order.limit_price` once fired
    async fn place_trigger_limit_order(
        &self,
        symbol: &str,
        order: &BracketOrder,
        stop_price_type: StopPriceType,
    ) -> Result<PlacedOrder, ExchangeError>;

    /// Trigger order that executes at market once fired
    async fn place_trigger_market_order(
        &self,
        symbol: &str,
        order: &BracketOrder,
        stop_price_type: StopPriceType,
    ) -> Result<PlacedOrder, ExchangeError>;
}
