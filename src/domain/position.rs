use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::order::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position on this side
    pub fn entry_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces or closes a position on this side
    pub fn close_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }

    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// An open position as reported by the exchange. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    /// Size in contracts (unsigned; direction lives in `side`)
    pub contracts: f64,
    pub mark_price: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Entry price is zero, position cannot be used for bracket sizing")]
    ZeroEntryPrice,
    #[error("Position size is zero")]
    ZeroContracts,
}

impl Position {
    pub fn new(symbol: impl Into<String>, side: PositionSide, entry_price: f64, contracts: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            contracts: contracts.abs(),
            mark_price: entry_price,
            opened_at: None,
        }
    }

    pub fn with_mark_price(mut self, mark_price: f64) -> Self {
        self.mark_price = mark_price;
        self
    }

    pub fn with_opened_at(mut self, opened_at: DateTime<Utc>) -> Self {
        self.opened_at = Some(opened_at);
        self
    }

    /// Whole contracts available for reduce-only brackets
    pub fn bracket_amount(&self) -> Result<u64, PositionError> {
        if self.entry_price == 0.0 {
            return Err(PositionError::ZeroEntryPrice);
        }
        let amount = self.contracts.abs().trunc() as u64;
        if amount == 0 {
            return Err(PositionError::ZeroContracts);
        }
        Ok(amount)
    }
}
