use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::{BracketOrder, ExchangeOrder, OrderRole, OrderStatus, PlacedOrder, Position};
use crate::ports::exchange::{ExchangeError, ExchangePort};
use crate::ports::market_data::{Balance, Ohlcv, Timeframe};
use crate::strategy::params::{MarginMode, StopPriceType};

#[derive(Debug)]
struct MockState {
    contract_size: f64,
    min_amount: f64,
    balance: Balance,
    candles: Vec<Ohlcv>,
    open_orders: Vec<ExchangeOrder>,
    trigger_orders: Vec<ExchangeOrder>,
    closed_trigger_orders: Vec<ExchangeOrder>,
    positions: Vec<Position>,
    placed: Vec<(String, BracketOrder)>,
    closed_positions: Vec<Position>,
    calls: Vec<String>,
    next_id: u64,
    failing_cancels: HashSet<String>,
    failing_roles: HashSet<OrderRole>,
    fail_close: bool,
    fail_positions: bool,
    fail_closed_orders: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            contract_size: 0.001,
            min_amount: 1.0,
            balance: Balance::default(),
            candles: Vec::new(),
            open_orders: Vec::new(),
            trigger_orders: Vec::new(),
            closed_trigger_orders: Vec::new(),
            positions: Vec::new(),
            placed: Vec::new(),
            closed_positions: Vec::new(),
            calls: Vec::new(),
            next_id: 1,
            failing_cancels: HashSet::new(),
            failing_roles: HashSet::new(),
            fail_close: false,
            fail_positions: false,
            fail_closed_orders: false,
        }
    }
}

/// In-memory exchange that keeps orders and positions between calls
/// and records every request, for driving whole run cycles in tests
#[derive(Debug, Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_contract_size(self, contract_size: f64) -> Self {
        self.state().contract_size = contract_size;
        self
    }

    pub fn with_min_amount(self, min_amount: f64) -> Self {
        self.state().min_amount = min_amount;
        self
    }

    pub fn with_balance(self, free: f64) -> Self {
        self.state().balance = Balance { free, total: free };
        self
    }

    pub fn with_candles(self, candles: Vec<Ohlcv>) -> Self {
        self.state().candles = candles;
        self
    }

    pub fn with_position(self, position: Position) -> Self {
        self.state().positions.push(position);
        self
    }

    pub fn with_open_order(self, order: ExchangeOrder) -> Self {
        self.state().open_orders.push(order);
        self
    }

    pub fn with_trigger_order(self, order: ExchangeOrder) -> Self {
        self.state().trigger_orders.push(order);
        self
    }

    pub fn with_closed_trigger_order(self, order: ExchangeOrder) -> Self {
        self.state().closed_trigger_orders.push(order);
        self
    }

    /// Cancelling `id` will fail
    pub fn failing_cancel(self, id: &str) -> Self {
        self.state().failing_cancels.insert(id.to_string());
        self
    }

    /// Placing any leg with `role` will fail
    pub fn failing_role(self, role: OrderRole) -> Self {
        self.state().failing_roles.insert(role);
        self
    }

    pub fn failing_close(self) -> Self {
        self.state().fail_close = true;
        self
    }

    pub fn failing_positions(self) -> Self {
        self.state().fail_positions = true;
        self
    }

    pub fn failing_closed_orders(self) -> Self {
        self.state().fail_closed_orders = true;
        self
    }

    pub fn set_candles(&self, candles: Vec<Ohlcv>) {
        self.state().candles = candles;
    }

    pub fn set_balance(&self, free: f64) {
        self.state().balance = Balance { free, total: free };
    }

    pub fn add_position(&self, position: Position) {
        self.state().positions.push(position);
    }

    /// Simulate a trigger firing: the open trigger order moves to the closed list
    pub fn trigger(&self, id: &str) -> bool {
        let mut state = self.state();
        let Some(index) = state.trigger_orders.iter().position(|o| o.id == id) else {
            return false;
        };
        let order = state.trigger_orders.remove(index);
        state.closed_trigger_orders.push(order.with_status(OrderStatus::Triggered));
        true
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == method).count()
    }

    /// Every leg successfully placed, in placement order
    pub fn placed_orders(&self) -> Vec<(String, BracketOrder)> {
        self.state().placed.clone()
    }

    pub fn open_trigger_orders(&self) -> Vec<ExchangeOrder> {
        self.state().trigger_orders.clone()
    }

    pub fn open_orders(&self) -> Vec<ExchangeOrder> {
        self.state().open_orders.clone()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.state().positions.clone()
    }

    pub fn closed_positions(&self) -> Vec<Position> {
        self.state().closed_positions.clone()
    }

    pub fn clear_placed(&self) {
        self.state().placed.clear();
    }

    fn record(&self, method: &str) {
        self.state().calls.push(method.to_string());
    }

    fn place(&self, order: &BracketOrder) -> Result<PlacedOrder, ExchangeError> {
        let mut state = self.state();
        if state.failing_roles.contains(&order.role) {
            return Err(ExchangeError::api("400100", format!("{} rejected", order.role)));
        }

        let id = format!("mock-{}", state.next_id);
        state.next_id += 1;

        let mut listed = ExchangeOrder::new(id.clone(), order.side)
            .with_reduce_only(order.reduce_only)
            .with_trigger_price(order.trigger_price)
            .with_status(OrderStatus::Open);
        listed.amount = Some(order.amount as f64);
        state.trigger_orders.push(listed);
        state.placed.push((id.clone(), order.clone()));

        Ok(PlacedOrder { id })
    }
}

#[async_trait]
impl ExchangePort for MockExchange {
    async fn contract_size(&self, _symbol: &str) -> Result<f64, ExchangeError> {
        self.record("contract_size");
        Ok(self.state().contract_size)
    }

    async fn fetch_open_orders(&self, _symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        self.record("fetch_open_orders");
        Ok(self.state().open_orders.clone())
    }

    async fn cancel_order(&self, id: &str, _symbol: &str) -> Result<(), ExchangeError> {
        self.record("cancel_order");
        let mut state = self.state();
        if state.failing_cancels.contains(id) {
            return Err(ExchangeError::api("400100", format!("cannot cancel {}", id)));
        }
        state.open_orders.retain(|o| o.id != id);
        Ok(())
    }

    async fn fetch_open_trigger_orders(&self, _symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        self.record("fetch_open_trigger_orders");
        Ok(self.state().trigger_orders.clone())
    }

    async fn cancel_trigger_order(&self, id: &str, _symbol: &str) -> Result<(), ExchangeError> {
        self.record("cancel_trigger_order");
        let mut state = self.state();
        if state.failing_cancels.contains(id) {
            return Err(ExchangeError::api("400100", format!("cannot cancel {}", id)));
        }
        let Some(index) = state.trigger_orders.iter().position(|o| o.id == id) else {
            return Err(ExchangeError::api("404000", format!("order {} not found", id)));
        };
        let order = state.trigger_orders.remove(index);
        state.closed_trigger_orders.push(order.with_status(OrderStatus::Cancelled));
        Ok(())
    }

    async fn fetch_closed_trigger_orders(&self, _symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        self.record("fetch_closed_trigger_orders");
        let state = self.state();
        if state.fail_closed_orders {
            return Err(ExchangeError::Network("closed orders unavailable".to_string()));
        }
        Ok(state.closed_trigger_orders.clone())
    }

    async fn fetch_open_positions(&self, _symbol: &str) -> Result<Vec<Position>, ExchangeError> {
        self.record("fetch_open_positions");
        let state = self.state();
        if state.fail_positions {
            return Err(ExchangeError::Network("positions unavailable".to_string()));
        }
        Ok(state.positions.clone())
    }

    async fn close_position(&self, position: &Position) -> Result<(), ExchangeError> {
        self.record("close_position");
        let mut state = self.state();
        if state.fail_close {
            return Err(ExchangeError::api("300000", "close rejected"));
        }
        let before = state.positions.len();
        state.positions.retain(|p| p != position);
        if state.positions.len() == before {
            return Err(ExchangeError::InvalidRequest("no such position".to_string()));
        }
        state.closed_positions.push(position.clone());
        Ok(())
    }

    async fn set_margin_mode(&self, _symbol: &str, _mode: MarginMode) -> Result<(), ExchangeError> {
        self.record("set_margin_mode");
        Ok(())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32, _mode: MarginMode) -> Result<(), ExchangeError> {
        self.record("set_leverage");
        Ok(())
    }

    async fn fetch_balance(&self, _currency: &str) -> Result<Balance, ExchangeError> {
        self.record("fetch_balance");
        Ok(self.state().balance)
    }

    async fn fetch_min_amount_tradable(&self, _symbol: &str) -> Result<f64, ExchangeError> {
        self.record("fetch_min_amount_tradable");
        Ok(self.state().min_amount)
    }

    async fn fetch_recent_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, ExchangeError> {
        self.record("fetch_recent_ohlcv");
        let state = self.state();
        let start = state.candles.len().saturating_sub(limit);
        Ok(state.candles[start..].to_vec())
    }

    async fn place_trigger_limit_order(
        &self,
        _symbol: &str,
        order: &BracketOrder,
        _stop_price_type: StopPriceType,
    ) -> Result<PlacedOrder, ExchangeError> {
        self.record("place_trigger_limit_order");
        if order.limit_price.is_none() {
            return Err(ExchangeError::InvalidRequest("limit price required".to_string()));
        }
        self.place(order)
    }

    async fn place_trigger_market_order(
        &self,
        _symbol: &str,
        order: &BracketOrder,
        _stop_price_type: StopPriceType,
    ) -> Result<PlacedOrder, ExchangeError> {
        self.record("place_trigger_market_order");
        self.place(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderSide, PositionSide};

    const SYMBOL: &str = "BTC/USDT:USDT";

    #[tokio::test]
    async fn test_placed_orders_are_listed_then_cancelled() {
        let exchange = MockExchange::new();
        let leg = BracketOrder::stop_loss(OrderSide::Sell, 90.0, 3);
        let placed = exchange
            .place_trigger_market_order(SYMBOL, &leg, StopPriceType::MarkPrice)
            .await
            .unwrap();
        assert_eq!(placed.id, "mock-1");

        let open = exchange.fetch_open_trigger_orders(SYMBOL).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].reduce_only, Some(true));

        exchange.cancel_trigger_order(&placed.id, SYMBOL).await.unwrap();
        assert!(exchange.open_trigger_orders().is_empty());
        let closed = exchange.fetch_closed_trigger_orders(SYMBOL).await.unwrap();
        assert!(closed[0].was_cancelled());
    }

    #[tokio::test]
    async fn test_trigger_fires_order() {
        let exchange = MockExchange::new();
        let leg = BracketOrder::stop_loss(OrderSide::Sell, 90.0, 3);
        let placed = exchange
            .place_trigger_market_order(SYMBOL, &leg, StopPriceType::MarkPrice)
            .await
            .unwrap();

        assert!(exchange.trigger(&placed.id));
        assert!(!exchange.trigger("unknown"));
        let closed = exchange.fetch_closed_trigger_orders(SYMBOL).await.unwrap();
        assert_eq!(closed[0].status, Some(OrderStatus::Triggered));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let exchange = MockExchange::new()
            .with_trigger_order(ExchangeOrder::new("stuck", OrderSide::Buy))
            .failing_cancel("stuck")
            .failing_role(OrderRole::TakeProfit);

        assert!(exchange.cancel_trigger_order("stuck", SYMBOL).await.is_err());
        let tp = BracketOrder::take_profit(OrderSide::Sell, 100.0, 1);
        assert!(exchange
            .place_trigger_market_order(SYMBOL, &tp, StopPriceType::MarkPrice)
            .await
            .is_err());
        assert_eq!(exchange.call_count("cancel_trigger_order"), 1);
    }

    #[test]
    fn test_close_position() {
        let position = Position::new(SYMBOL, PositionSide::Long, 100.0, 2.0);
        let exchange = MockExchange::new().with_position(position.clone());

        tokio_test::block_on(exchange.close_position(&position)).unwrap();
        assert!(exchange.positions().is_empty());
        assert_eq!(exchange.closed_positions(), vec![position.clone()]);
        assert!(tokio_test::block_on(exchange.close_position(&position)).is_err());
    }
}
