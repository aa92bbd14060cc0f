//! Order Reconciler
//!
//! Clears the previous cycle's orders and works out what happened to them:
//! how many entry triggers were still waiting per side, and whether a tracked
//! stop loss fired since the last run.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{ExchangeOrder, OrderSide, PositionSide, TrackerError, TrackerState, TrackerStatus, TrackerStore};
use crate::ports::exchange::ExchangePort;

/// What the reconciliation pass found and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Buy-side entry triggers that were still waiting
    pub pending_longs: usize,
    /// Sell-side entry triggers that were still waiting
    pub pending_shorts: usize,
    pub cancelled: usize,
    pub cancel_failures: usize,
    /// Side of the position closed by a tracked stop loss, if one fired
    pub stop_loss_fired: Option<PositionSide>,
}

impl ReconcileReport {
    pub fn pending_entries(&self, side: PositionSide) -> usize {
        match side {
            PositionSide::Long => self.pending_longs,
            PositionSide::Short => self.pending_shorts,
        }
    }
}

pub struct OrderReconciler {
    exchange: Arc<dyn ExchangePort>,
    symbol: String,
}

impl OrderReconciler {
    pub fn new(exchange: Arc<dyn ExchangePort>, symbol: impl Into<String>) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
        }
    }

    /// Cancel every open order, count pending entries, and detect a fired stop loss.
    ///
    /// A detected fill pauses `state` and is persisted before returning. Only a
    /// tracker write failure is an error; exchange failures are logged.
    pub async fn reconcile(
        &self,
        state: &mut TrackerState,
        store: &TrackerStore,
    ) -> Result<ReconcileReport, TrackerError> {
        let mut report = ReconcileReport::default();
        let mut still_open: HashSet<String> = HashSet::new();

        match self.exchange.fetch_open_orders(&self.symbol).await {
            Ok(orders) => {
                for order in unique(orders) {
                    match self.exchange.cancel_order(&order.id, &self.symbol).await {
                        Ok(()) => report.cancelled += 1,
                        Err(e) => {
                            tracing::warn!("Failed to cancel order {}: {}", order.id, e);
                            report.cancel_failures += 1;
                            still_open.insert(order.id);
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to list open orders for {}: {}", self.symbol, e),
        }

        match self.exchange.fetch_open_trigger_orders(&self.symbol).await {
            Ok(orders) => {
                for order in unique(orders) {
                    if order.is_pending_entry() {
                        match order.side {
                            OrderSide::Buy => report.pending_longs += 1,
                            OrderSide::Sell => report.pending_shorts += 1,
                        }
                    }
                    match self.exchange.cancel_trigger_order(&order.id, &self.symbol).await {
                        Ok(()) => report.cancelled += 1,
                        Err(e) => {
                            tracing::warn!("Failed to cancel trigger order {}: {}", order.id, e);
                            report.cancel_failures += 1;
                            still_open.insert(order.id);
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to list trigger orders for {}: {}", self.symbol, e),
        }

        tracing::info!(
            "Cancelled {} orders ({} failed), pending entries: {} long / {} short",
            report.cancelled,
            report.cancel_failures,
            report.pending_longs,
            report.pending_shorts
        );

        if state.stop_loss_ids.is_empty() {
            return Ok(report);
        }

        let closed = match self.exchange.fetch_closed_trigger_orders(&self.symbol).await {
            Ok(closed) => closed,
            Err(e) => {
                tracing::warn!("Failed to fetch closed trigger orders, keeping tracked stop losses: {}", e);
                return Ok(report);
            }
        };

        let fired = closed
            .iter()
            .rev()
            .find(|o| state.is_tracked(&o.id) && !o.was_cancelled());

        match fired {
            Some(order) => {
                // a filled sell stop closed a long and vice versa
                let side = match order.side {
                    OrderSide::Sell => PositionSide::Long,
                    OrderSide::Buy => PositionSide::Short,
                };
                tracing::warn!("Stop loss {} fired on the {} side, pausing entries", order.id, side);
                state.pause(TrackerStatus::StopLossTriggered, side);
                store.save(state)?;
                report.stop_loss_fired = Some(side);
            }
            None => {
                state.stop_loss_ids.retain(|id| still_open.contains(id));
            }
        }

        Ok(report)
    }
}

/// Drop repeated ids, keeping the first listing
fn unique(orders: Vec<ExchangeOrder>) -> Vec<ExchangeOrder> {
    let mut seen = HashSet::new();
    orders.into_iter().filter(|o| seen.insert(o.id.clone())).collect()
}
