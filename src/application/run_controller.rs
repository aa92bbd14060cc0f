//! Run Controller
//!
//! One invocation = one "reconcile, decide, act, persist" cycle:
//! 1. load the tracker (abort if unreadable)
//! 2. cancel last cycle's orders and detect a fired stop loss
//! 3. compute envelope bands from completed candles
//! 4. enforce a single open position and the price-jump kill switch
//! 5. gate new entries after an exit until price crosses back through the average
//! 6. protect the open position, or lay a fresh entry ladder
//! 7. commit the tracker

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::application::brackets::{BracketError, BracketOrchestrator, BracketReport};
use crate::application::reconciler::{OrderReconciler, ReconcileReport};
use crate::domain::resume_gate::{self, GateDecision};
use crate::domain::{
    Position, PriceJumpCheck, SafetyNet, SafetyNetError, TrackerError, TrackerState, TrackerStatus,
    TrackerStore,
};
use crate::ports::exchange::{ExchangeError, ExchangePort};
use crate::ports::market_data::Timeframe;
use crate::strategy::bands::{BandCalculator, BandError, EnvelopeBands};
use crate::strategy::params::{EnvelopeConfig, MarginMode, ParamError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Tracker file {0} could not be read; fix or reset it before trading")]
    TrackerUnreadable(PathBuf),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    AmbiguousPositions(#[from] SafetyNetError),

    #[error("Open position has a zero entry price, cannot place brackets")]
    ZeroEntryPrice,

    #[error(transparent)]
    InsufficientData(#[from] BandError),

    #[error("Free balance is {0}, nothing to allocate")]
    NonPositiveBalance(f64),

    #[error("Exchange error while {context}: {source}")]
    Exchange {
        context: &'static str,
        #[source]
        source: ExchangeError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ParamError),
}

impl From<BracketError> for RunError {
    fn from(e: BracketError) -> Self {
        match e {
            BracketError::ZeroEntryPrice => RunError::ZeroEntryPrice,
            BracketError::NonPositiveBalance(free) => RunError::NonPositiveBalance(free),
            BracketError::Exchange { context, source } => RunError::Exchange { context, source },
        }
    }
}

fn exchange_error(context: &'static str) -> impl FnOnce(ExchangeError) -> RunError {
    move |source| RunError::Exchange { context, source }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Brackets placed (possibly partially) and the tracker committed
    Completed(BracketReport),
    /// Entries still paused after an exit; no orders placed
    ResumeBlocked,
    /// Position force-closed after a price jump
    KillSwitchFired,
}

/// Market and account settings for a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub margin_mode: MarginMode,
    pub leverage: u32,
    pub quote_currency: String,
}

/// Everything one run owns: configuration, the exchange handle, the tracker
/// store and the tracker state being worked on
pub struct RunContext {
    pub settings: RunSettings,
    pub strategy: EnvelopeConfig,
    pub exchange: Arc<dyn ExchangePort>,
    pub store: TrackerStore,
    pub state: TrackerState,
}

pub struct RunController {
    ctx: RunContext,
}

impl RunController {
    pub fn new(
        settings: RunSettings,
        strategy: EnvelopeConfig,
        exchange: Arc<dyn ExchangePort>,
        store: TrackerStore,
    ) -> Self {
        Self {
            ctx: RunContext {
                settings,
                strategy,
                exchange,
                store,
                state: TrackerState::default(),
            },
        }
    }

    /// Tracker state as of the end of the last `run`
    pub fn state(&self) -> &TrackerState {
        &self.ctx.state
    }

    pub fn store(&self) -> &TrackerStore {
        &self.ctx.store
    }

    /// Execute one full cycle
    pub async fn run(&mut self) -> Result<RunOutcome, RunError> {
        self.ctx.strategy.validate()?;
        let symbol = self.ctx.settings.symbol.clone();
        let exchange = self.ctx.exchange.clone();

        self.ctx.state = self.ctx.store.load()?;
        if self.ctx.state.status == TrackerStatus::ErrorReadingTracker {
            tracing::error!("Tracker unreadable, aborting before touching the exchange");
            return Err(RunError::TrackerUnreadable(self.ctx.store.path().to_path_buf()));
        }
        tracing::info!(
            "Run start {}: status={}, last_side={:?}, tracked stop losses={}",
            symbol,
            self.ctx.state.status.as_str(),
            self.ctx.state.last_side,
            self.ctx.state.stop_loss_ids.len()
        );

        let contract_size = exchange
            .contract_size(&symbol)
            .await
            .map_err(exchange_error("loading contract metadata"))?;

        let reconciler = OrderReconciler::new(exchange.clone(), symbol.clone());
        let reconciled = reconciler.reconcile(&mut self.ctx.state, &self.ctx.store).await?;

        let bands = self.compute_bands().await?;

        let position = self.single_position().await?;

        if let Some(position) = &position {
            if self.kill_switch(position, bands.latest_close).await? {
                return Ok(RunOutcome::KillSwitchFired);
            }
        }

        match resume_gate::evaluate(&self.ctx.state, bands.latest_close, bands.average) {
            GateDecision::Open => {}
            GateDecision::Resume => {
                tracing::info!(
                    "Close {:.4} crossed back through the average {:.4}, resuming",
                    bands.latest_close,
                    bands.average
                );
                self.ctx.state.resume();
                self.ctx.store.save(&self.ctx.state)?;
            }
            GateDecision::Blocked => {
                tracing::info!(
                    "Entries paused ({}, last side {:?}): close {:.4}, average {:.4}",
                    self.ctx.state.status.as_str(),
                    self.ctx.state.last_side,
                    bands.latest_close,
                    bands.average
                );
                return Ok(RunOutcome::ResumeBlocked);
            }
        }

        let orchestrator = BracketOrchestrator::new(exchange.clone(), symbol.clone(), self.ctx.strategy.clone());
        let report = match &position {
            Some(position) => orchestrator.protect_position(position, bands.average).await?,
            None => {
                self.prepare_margin().await;
                self.place_ladder(&orchestrator, &bands, &reconciled, contract_size)
                    .await?
            }
        };

        self.commit(&report, position.as_ref())?;
        Ok(RunOutcome::Completed(report))
    }

    async fn compute_bands(&self) -> Result<EnvelopeBands, RunError> {
        let strategy = &self.ctx.strategy;
        let candles = self
            .ctx
            .exchange
            .fetch_recent_ohlcv(&self.ctx.settings.symbol, self.ctx.settings.timeframe, strategy.ohlcv_limit())
            .await
            .map_err(exchange_error("fetching candles"))?;

        let calculator = BandCalculator::new(strategy.average_type, strategy.average_period, strategy.envelopes.clone());
        Ok(calculator.calculate(&candles)?)
    }

    /// Close every position but the newest, then insist on at most one
    async fn single_position(&self) -> Result<Option<Position>, RunError> {
        let symbol = &self.ctx.settings.symbol;
        let safety_net = SafetyNet::new(self.ctx.strategy.price_jump_pct);
        let positions = self
            .ctx
            .exchange
            .fetch_open_positions(symbol)
            .await
            .map_err(exchange_error("fetching positions"))?;

        if positions.len() <= 1 {
            return Ok(positions.into_iter().next());
        }

        tracing::warn!("{} open positions on {}, keeping the most recent", positions.len(), symbol);
        let triage = safety_net.triage(positions);
        for position in &triage.close {
            if let Err(e) = self.ctx.exchange.close_position(position).await {
                tracing::warn!("Failed to close extra {} position: {}", position.side, e);
            }
        }

        let remaining = self
            .ctx
            .exchange
            .fetch_open_positions(symbol)
            .await
            .map_err(exchange_error("re-fetching positions"))?;
        Ok(safety_net.single(remaining)?)
    }

    /// Returns true when the position was force-closed
    async fn kill_switch(&mut self, position: &Position, latest_close: f64) -> Result<bool, RunError> {
        let safety_net = SafetyNet::new(self.ctx.strategy.price_jump_pct);
        match safety_net.check_price_jump(position, latest_close) {
            PriceJumpCheck::Disabled | PriceJumpCheck::Within { .. } => Ok(false),
            PriceJumpCheck::Skipped => {
                tracing::warn!("Position entry price is zero, skipping price jump check");
                Ok(false)
            }
            PriceJumpCheck::Breached { threshold } => {
                tracing::warn!(
                    "Price jump on {} position: close {:.4} beyond {:.4}, closing everything",
                    position.side,
                    latest_close,
                    threshold
                );
                self.ctx
                    .exchange
                    .close_position(position)
                    .await
                    .map_err(exchange_error("closing position after price jump"))?;
                self.ctx.state.pause(TrackerStatus::CloseAllTriggered, position.side);
                self.ctx.store.save(&self.ctx.state)?;
                Ok(true)
            }
        }
    }

    async fn prepare_margin(&self) {
        let settings = &self.ctx.settings;
        if let Err(e) = self
            .ctx
            .exchange
            .set_margin_mode(&settings.symbol, settings.margin_mode)
            .await
        {
            tracing::warn!("Failed to set {} margin mode: {}", settings.margin_mode.as_str(), e);
        }
        if let Err(e) = self
            .ctx
            .exchange
            .set_leverage(&settings.symbol, settings.leverage, settings.margin_mode)
            .await
        {
            tracing::warn!("Failed to set leverage {}x: {}", settings.leverage, e);
        }
    }

    async fn place_ladder(
        &self,
        orchestrator: &BracketOrchestrator,
        bands: &EnvelopeBands,
        reconciled: &ReconcileReport,
        contract_size: f64,
    ) -> Result<BracketReport, RunError> {
        Ok(orchestrator
            .place_ladder(
                bands,
                reconciled.pending_longs,
                reconciled.pending_shorts,
                contract_size,
                &self.ctx.settings.quote_currency,
            )
            .await?)
    }

    /// A managed position becomes the last side; a flat ladder keeps the previous one
    fn commit(&mut self, report: &BracketReport, position: Option<&Position>) -> Result<(), RunError> {
        let state = &mut self.ctx.state;
        state.status = TrackerStatus::OkToTrade;
        if let Some(position) = position {
            state.last_side = Some(position.side);
        }
        state.stop_loss_ids = report.stop_loss_ids.clone();
        state.stop_loss_price = report.stop_loss_price;
        self.ctx.store.save(state)?;
        tracing::info!(
            "Run complete: {} orders placed, {} failed, tracking {} stop losses",
            report.placed,
            report.failed,
            state.stop_loss_ids.len()
        );
        Ok(())
    }
}
