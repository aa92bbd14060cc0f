//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - The perpetual-futures exchange (orders, positions, balance, candles)
//! - Market data value types shared by adapters and the strategy

pub mod exchange;
pub mod market_data;
pub mod mocks;

pub use exchange::{ExchangeError, ExchangePort};
pub use market_data::{Balance, MarketDataError, Ohlcv, Timeframe};
