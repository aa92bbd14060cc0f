//! Strategy Parameters
//!
//! Configuration structs for the envelope strategy.
//! Defaults mirror a conservative hourly BTC setup.

use serde::{Deserialize, Serialize};

/// Entry trigger offset from the band price (1h candles)
pub const DEFAULT_TRIGGER_PRICE_DELTA: f64 = 0.005;

/// Completed candles fetched on top of the averaging window
pub const DEFAULT_OHLCV_HISTORY: usize = 100;

/// Moving average used as the envelope centre line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AverageType {
    #[serde(rename = "SMA")]
    Sma,
    #[serde(rename = "EMA")]
    Ema,
    #[serde(rename = "WMA")]
    Wma,
    /// Midpoint of the Donchian high/low channel
    #[serde(rename = "DCM", alias = "DonchianMid")]
    DonchianMid,
}

impl std::fmt::Display for AverageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AverageType::Sma => "SMA",
            AverageType::Ema => "EMA",
            AverageType::Wma => "WMA",
            AverageType::DonchianMid => "DCM",
        };
        f.write_str(name)
    }
}

/// Reference price that fires trigger orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopPriceType {
    #[serde(rename = "MP", alias = "MarkPrice")]
    MarkPrice,
    #[serde(rename = "IP", alias = "IndexPrice")]
    IndexPrice,
    #[serde(rename = "TP", alias = "LastTradePrice")]
    LastTradePrice,
}

impl StopPriceType {
    /// Venue code (`MP` / `IP` / `TP`)
    pub fn code(&self) -> &'static str {
        match self {
            StopPriceType::MarkPrice => "MP",
            StopPriceType::IndexPrice => "IP",
            StopPriceType::LastTradePrice => "TP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
}

impl MarginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginMode::Isolated => "isolated",
            MarginMode::Cross => "cross",
        }
    }
}

/// Main strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub average_type: AverageType,
    /// Averaging window in candles
    pub average_period: usize,
    /// Band offsets as fractions of the average, tightest first
    pub envelopes: Vec<f64>,
    /// Stop distance from the entry (band) price
    pub stop_loss_pct: f64,
    /// Emergency close distance from the entry price, disabled when `None`
    pub price_jump_pct: Option<f64>,
    pub use_longs: bool,
    pub use_shorts: bool,
    /// Fraction of free balance spread across all envelope levels
    pub balance_fraction: f64,
    pub trigger_price_delta: f64,
    pub stop_price_type: StopPriceType,
    pub ohlcv_history: usize,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            average_type: AverageType::DonchianMid,
            average_period: 5,
            envelopes: vec![0.07, 0.11, 0.14],
            stop_loss_pct: 0.4,
            price_jump_pct: None,
            use_longs: true,
            use_shorts: true,
            balance_fraction: 1.0,
            trigger_price_delta: DEFAULT_TRIGGER_PRICE_DELTA,
            stop_price_type: StopPriceType::MarkPrice,
            ohlcv_history: DEFAULT_OHLCV_HISTORY,
        }
    }
}

impl EnvelopeConfig {
    pub fn with_envelopes(mut self, envelopes: Vec<f64>) -> Self {
        self.envelopes = envelopes;
        self
    }

    pub fn with_average(mut self, average_type: AverageType, period: usize) -> Self {
        self.average_type = average_type;
        self.average_period = period;
        self
    }

    pub fn with_price_jump_pct(mut self, pct: f64) -> Self {
        self.price_jump_pct = Some(pct);
        self
    }

    /// Candles to request: history plus the averaging window
    pub fn ohlcv_limit(&self) -> usize {
        self.ohlcv_history + self.average_period
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.average_period == 0 {
            return Err(ParamError::InvalidAveragePeriod(self.average_period));
        }
        if self.envelopes.is_empty() {
            return Err(ParamError::NoEnvelopes);
        }
        for &e in &self.envelopes {
            if e <= 0.0 || e >= 1.0 {
                return Err(ParamError::InvalidEnvelope(e));
            }
        }
        if self.envelopes.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ParamError::UnorderedEnvelopes);
        }
        if self.stop_loss_pct <= 0.0 || self.stop_loss_pct >= 1.0 {
            return Err(ParamError::InvalidStopLoss(self.stop_loss_pct));
        }
        if let Some(pct) = self.price_jump_pct {
            if pct <= 0.0 || pct >= 1.0 {
                return Err(ParamError::InvalidPriceJump(pct));
            }
        }
        if self.balance_fraction <= 0.0 || self.balance_fraction > 1.0 {
            return Err(ParamError::InvalidBalanceFraction(self.balance_fraction));
        }
        if self.trigger_price_delta < 0.0 || self.trigger_price_delta >= 1.0 {
            return Err(ParamError::InvalidTriggerDelta(self.trigger_price_delta));
        }
        if !self.use_longs && !self.use_shorts {
            return Err(ParamError::NoSideEnabled);
        }
        Ok(())
    }
}

/// Parameter validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("Invalid average period: {0} (minimum 1)")]
    InvalidAveragePeriod(usize),
    #[error("At least one envelope is required")]
    NoEnvelopes,
    #[error("Invalid envelope: {0} (must be 0 < e < 1)")]
    InvalidEnvelope(f64),
    #[error("Envelopes must be strictly increasing, tightest first")]
    UnorderedEnvelopes,
    #[error("Invalid stop loss: {0} (must be 0 < pct < 1)")]
    InvalidStopLoss(f64),
    #[error("Invalid price jump: {0} (must be 0 < pct < 1)")]
    InvalidPriceJump(f64),
    #[error("Invalid balance fraction: {0} (must be 0 < fraction <= 1)")]
    InvalidBalanceFraction(f64),
    #[error("Invalid trigger price delta: {0} (must be 0 <= delta < 1)")]
    InvalidTriggerDelta(f64),
    #[error("Both use_longs and use_shorts are disabled")]
    NoSideEnabled,
}
