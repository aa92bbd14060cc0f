//! Orders
//!
//! Bracket legs the bot places and the typed view of orders the exchange reports back.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a leg inside a bracket group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderRole {
    Entry,
    TakeProfit,
    StopLoss,
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderRole::Entry => write!(f, "entry"),
            OrderRole::TakeProfit => write!(f, "TP"),
            OrderRole::StopLoss => write!(f, "SL"),
        }
    }
}

/// Direction the reference price must cross for a trigger order to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerDirection {
    Rising,
    Falling,
}

/// One leg of an entry / take-profit / stop-loss group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketOrder {
    pub role: OrderRole,
    pub side: OrderSide,
    pub trigger_price: f64,
    /// Limit price once triggered; `None` executes at market
    pub limit_price: Option<f64>,
    pub amount: u64,
    pub reduce_only: bool,
    pub trigger_direction: TriggerDirection,
}

impl BracketOrder {
    /// Trigger-limit entry that opens exposure
    pub fn entry(side: OrderSide, trigger_price: f64, limit_price: f64, amount: u64) -> Self {
        // Buys wait for price to fall into the lower band, sells for it to rise into the upper one
        let trigger_direction = match side {
            OrderSide::Buy => TriggerDirection::Falling,
            OrderSide::Sell => TriggerDirection::Rising,
        };
        Self {
            role: OrderRole::Entry,
            side,
            trigger_price,
            limit_price: Some(limit_price),
            amount,
            reduce_only: false,
            trigger_direction,
        }
    }

    /// Reduce-only trigger-market exit at the moving average.
    /// `side` is the closing side (sell closes a long).
    pub fn take_profit(side: OrderSide, trigger_price: f64, amount: u64) -> Self {
        let trigger_direction = match side {
            OrderSide::Sell => TriggerDirection::Rising,
            OrderSide::Buy => TriggerDirection::Falling,
        };
        Self {
            role: OrderRole::TakeProfit,
            side,
            trigger_price,
            limit_price: None,
            amount,
            reduce_only: true,
            trigger_direction,
        }
    }

    /// Reduce-only trigger-market protective stop
    pub fn stop_loss(side: OrderSide, trigger_price: f64, amount: u64) -> Self {
        let trigger_direction = match side {
            OrderSide::Sell => TriggerDirection::Falling,
            OrderSide::Buy => TriggerDirection::Rising,
        };
        Self {
            role: OrderRole::StopLoss,
            side,
            trigger_price,
            limit_price: None,
            amount,
            reduce_only: true,
            trigger_direction,
        }
    }
}

/// Lifecycle state reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    /// Trigger fired and the order executed
    Triggered,
    Cancelled,
}

/// Order as reported by the exchange. Optional fields may be missing from the venue response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub id: String,
    pub side: OrderSide,
    pub reduce_only: Option<bool>,
    pub trigger_price: Option<f64>,
    pub amount: Option<f64>,
    pub status: Option<OrderStatus>,
}

impl ExchangeOrder {
    pub fn new(id: impl Into<String>, side: OrderSide) -> Self {
        Self {
            id: id.into(),
            side,
            reduce_only: None,
            trigger_price: None,
            amount: None,
            status: None,
        }
    }

    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = Some(reduce_only);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_trigger_price(mut self, trigger_price: f64) -> Self {
        self.trigger_price = Some(trigger_price);
        self
    }

    /// Missing reduce-only flag counts as an entry so a stop-loss rebuild is never skipped silently
    pub fn is_reduce_only(&self) -> bool {
        self.reduce_only.unwrap_or(false)
    }

    pub fn is_pending_entry(&self) -> bool {
        !self.is_reduce_only()
    }

    pub fn was_cancelled(&self) -> bool {
        self.status == Some(OrderStatus::Cancelled)
    }
}

/// Acknowledgement for a placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_directions() {
        let long_entry = BracketOrder::entry(OrderSide::Buy, 95.5, 95.0, 3);
        assert_eq!(long_entry.trigger_direction, TriggerDirection::Falling);
        assert!(!long_entry.reduce_only);
        assert_eq!(long_entry.limit_price, Some(95.0));

        let short_entry = BracketOrder::entry(OrderSide::Sell, 104.5, 105.0, 3);
        assert_eq!(short_entry.trigger_direction, TriggerDirection::Rising);
    }

    #[test]
    fn test_exit_directions() {
        // closing a long
        let tp = BracketOrder::take_profit(OrderSide::Sell, 100.0, 3);
        let sl = BracketOrder::stop_loss(OrderSide::Sell, 60.0, 3);
        assert_eq!(tp.trigger_direction, TriggerDirection::Rising);
        assert_eq!(sl.trigger_direction, TriggerDirection::Falling);
        assert!(tp.reduce_only && sl.reduce_only);
        assert!(tp.limit_price.is_none());

        // closing a short
        let tp = BracketOrder::take_profit(OrderSide::Buy, 100.0, 3);
        let sl = BracketOrder::stop_loss(OrderSide::Buy, 140.0, 3);
        assert_eq!(tp.trigger_direction, TriggerDirection::Falling);
        assert_eq!(sl.trigger_direction, TriggerDirection::Rising);
    }

    #[test]
    fn test_missing_reduce_only_is_entry() {
        let order = ExchangeOrder::new("a", OrderSide::Buy);
        assert!(order.is_pending_entry());

        let order = ExchangeOrder::new("b", OrderSide::Sell).with_reduce_only(true);
        assert!(!order.is_pending_entry());
    }

    #[test]
    fn test_was_cancelled() {
        assert!(ExchangeOrder::new("a", OrderSide::Sell)
            .with_status(OrderStatus::Cancelled)
            .was_cancelled());
        assert!(!ExchangeOrder::new("a", OrderSide::Sell).was_cancelled());
    }
}
