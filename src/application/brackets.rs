//! Bracket Orchestrator
//!
//! Places the order groups for one cycle:
//! - with a position open, a take profit at the average and a protective stop;
//! - when flat, a ladder of entry / take-profit / stop-loss triggers per envelope level.
//!
//! Individual legs may fail without stopping the rest of the ladder.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::{BracketOrder, OrderRole, Position, PositionError, PositionSide};
use crate::ports::exchange::{ExchangeError, ExchangePort};
use crate::strategy::bands::EnvelopeBands;
use crate::strategy::params::EnvelopeConfig;

#[derive(Debug, Error)]
pub enum BracketError {
    #[error("Position entry price is zero, cannot place brackets")]
    ZeroEntryPrice,

    #[error("Free balance is {0}, nothing to allocate")]
    NonPositiveBalance(f64),

    #[error("Failed to fetch {context}: {source}")]
    Exchange {
        context: &'static str,
        #[source]
        source: ExchangeError,
    },
}

/// Summary of one placement pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BracketReport {
    pub placed: usize,
    pub failed: usize,
    pub skipped_levels: usize,
    /// Stop-loss ids placed this cycle, in placement order
    pub stop_loss_ids: Vec<String>,
    /// Trigger price of the last stop loss placed
    pub stop_loss_price: Option<f64>,
}

pub struct BracketOrchestrator {
    exchange: Arc<dyn ExchangePort>,
    symbol: String,
    config: EnvelopeConfig,
}

impl BracketOrchestrator {
    pub fn new(exchange: Arc<dyn ExchangePort>, symbol: impl Into<String>, config: EnvelopeConfig) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            config,
        }
    }

    /// Take profit at the average and stop loss off the entry price for an open position
    pub async fn protect_position(&self, position: &Position, average: f64) -> Result<BracketReport, BracketError> {
        let mut report = BracketReport::default();

        let amount = match position.bracket_amount() {
            Ok(amount) => amount,
            Err(PositionError::ZeroEntryPrice) => return Err(BracketError::ZeroEntryPrice),
            Err(PositionError::ZeroContracts) => {
                tracing::warn!("{} position has no whole contracts, skipping brackets", position.side);
                return Ok(report);
            }
        };

        let close_side = position.side.close_side();
        let stop_price = self.stop_price(position.side, position.entry_price);

        tracing::info!(
            "Managing {} position: {} contracts @ {:.4}, TP {:.4}, SL {:.4}",
            position.side,
            amount,
            position.entry_price,
            average,
            stop_price
        );

        let take_profit = BracketOrder::take_profit(close_side, average, amount);
        self.place(&take_profit, &mut report).await;

        let stop_loss = BracketOrder::stop_loss(close_side, stop_price, amount);
        self.place(&stop_loss, &mut report).await;

        Ok(report)
    }

    /// Entry ladder for every enabled side, skipping levels that are already waiting
    pub async fn place_ladder(
        &self,
        bands: &EnvelopeBands,
        pending_longs: usize,
        pending_shorts: usize,
        contract_size: f64,
        quote_currency: &str,
    ) -> Result<BracketReport, BracketError> {
        let balance = self
            .exchange
            .fetch_balance(quote_currency)
            .await
            .map_err(|source| BracketError::Exchange { context: "balance", source })?;
        if balance.free <= 0.0 {
            return Err(BracketError::NonPositiveBalance(balance.free));
        }

        let min_amount = self
            .exchange
            .fetch_min_amount_tradable(&self.symbol)
            .await
            .map_err(|source| BracketError::Exchange {
                context: "minimum order size",
                source,
            })?;

        let usdt_per_level = balance.free * self.config.balance_fraction / bands.levels.len() as f64;
        tracing::info!(
            "Free balance {:.2} {}, {:.2} per level, min amount {}",
            balance.free,
            quote_currency,
            usdt_per_level,
            min_amount
        );

        let mut report = BracketReport::default();
        let sides = [
            (PositionSide::Long, self.config.use_longs, pending_longs),
            (PositionSide::Short, self.config.use_shorts, pending_shorts),
        ];

        for (side, enabled, pending) in sides {
            if !enabled {
                continue;
            }
            if pending > 0 {
                tracing::info!("{} {} entries still pending, starting at level {}", pending, side, pending + 1);
            }

            for level in bands.levels.iter().skip(pending) {
                let band = match side {
                    PositionSide::Long => level.low_band,
                    PositionSide::Short => level.high_band,
                };

                if band <= 0.0 || contract_size <= 0.0 {
                    tracing::warn!(
                        "Level {} {}: invalid band {} or contract size {}, skipping",
                        level.index,
                        side,
                        band,
                        contract_size
                    );
                    report.skipped_levels += 1;
                    continue;
                }

                let amount = (usdt_per_level / (band * contract_size)).trunc();
                if amount < min_amount || amount < 1.0 {
                    tracing::info!(
                        "Level {} {}: amount {} below minimum {}, skipping",
                        level.index,
                        side,
                        amount,
                        min_amount
                    );
                    report.skipped_levels += 1;
                    continue;
                }
                let amount = amount as u64;

                let delta = self.config.trigger_price_delta;
                let trigger = match side {
                    PositionSide::Long => band * (1.0 + delta),
                    PositionSide::Short => band * (1.0 - delta),
                };

                let close_side = side.close_side();
                let legs = [
                    BracketOrder::entry(side.entry_side(), trigger, band, amount),
                    BracketOrder::take_profit(close_side, bands.average, amount),
                    BracketOrder::stop_loss(close_side, self.stop_price(side, band), amount),
                ];
                for leg in &legs {
                    self.place(leg, &mut report).await;
                }
            }
        }

        tracing::info!(
            "Ladder placed: {} orders, {} failed, {} levels skipped",
            report.placed,
            report.failed,
            report.skipped_levels
        );
        Ok(report)
    }

    fn stop_price(&self, side: PositionSide, reference: f64) -> f64 {
        match side {
            PositionSide::Long => reference * (1.0 - self.config.stop_loss_pct),
            PositionSide::Short => reference * (1.0 + self.config.stop_loss_pct),
        }
    }

    async fn place(&self, order: &BracketOrder, report: &mut BracketReport) {
        let stop_price_type = self.config.stop_price_type;
        let result = match order.role {
            OrderRole::Entry => {
                self.exchange
                    .place_trigger_limit_order(&self.symbol, order, stop_price_type)
                    .await
            }
            OrderRole::TakeProfit | OrderRole::StopLoss => {
                self.exchange
                    .place_trigger_market_order(&self.symbol, order, stop_price_type)
                    .await
            }
        };

        match result {
            Ok(placed) => {
                tracing::debug!(
                    "Placed {} {} {} @ {:.4} ({})",
                    order.role,
                    order.side,
                    order.amount,
                    order.trigger_price,
                    placed.id
                );
                report.placed += 1;
                if order.role == OrderRole::StopLoss {
                    report.stop_loss_ids.push(placed.id);
                    report.stop_loss_price = Some(order.trigger_price);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to place {} {} @ {:.4}: {}",
                    order.role,
                    order.side,
                    order.trigger_price,
                    e
                );
                report.failed += 1;
            }
        }
    }
}
