//! Strategy Layer - Envelope bands around a moving average
//!
//! - `params`: strategy configuration and validation
//! - `averages`: SMA / EMA / WMA / Donchian-midpoint series
//! - `bands`: envelope levels evaluated on the last completed candle

pub mod averages;
pub mod bands;
pub mod params;

pub use bands::{BandCalculator, BandError, EnvelopeBands, EnvelopeLevel};
pub use params::{AverageType, EnvelopeConfig, MarginMode, ParamError, StopPriceType};
