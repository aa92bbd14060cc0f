//! Envelope Bands
//!
//! Point-in-time centre line and symmetric percentage bands for one run.
//!
//! The most recent candle is dropped because it may still be forming, so
//! `latest_close` and `average` both refer to the last completed candle.

use thiserror::Error;

use crate::ports::market_data::Ohlcv;
use crate::strategy::averages::average_series;
use crate::strategy::params::AverageType;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BandError {
    #[error("Insufficient OHLCV data: need {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },
}

/// One band pair around the average; index 1 is the tightest
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeLevel {
    pub index: usize,
    pub low_band: f64,
    pub high_band: f64,
}

/// Bands evaluated on the last completed candle
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeBands {
    pub average: f64,
    pub latest_close: f64,
    pub levels: Vec<EnvelopeLevel>,
}

impl EnvelopeBands {
    /// Build levels for each offset `e`: `average * (1 ± e)`
    pub fn from_average(average: f64, latest_close: f64, envelopes: &[f64]) -> Self {
        let levels = envelopes
            .iter()
            .enumerate()
            .map(|(i, e)| EnvelopeLevel {
                index: i + 1,
                low_band: average * (1.0 - e),
                high_band: average * (1.0 + e),
            })
            .collect();
        Self {
            average,
            latest_close,
            levels,
        }
    }

    pub fn level(&self, index: usize) -> Option<&EnvelopeLevel> {
        self.levels.iter().find(|l| l.index == index)
    }
}

#[derive(Debug, Clone)]
pub struct BandCalculator {
    average_type: AverageType,
    period: usize,
    envelopes: Vec<f64>,
}

impl BandCalculator {
    pub fn new(average_type: AverageType, period: usize, envelopes: Vec<f64>) -> Self {
        Self {
            average_type,
            period,
            envelopes,
        }
    }

    /// Evaluate the bands over chronological candles, newest last
    pub fn calculate(&self, candles: &[Ohlcv]) -> Result<EnvelopeBands, BandError> {
        let complete = match candles.split_last() {
            Some((_, complete)) => complete,
            None => &[],
        };

        let series = average_series(complete, self.average_type, self.period);
        let defined: Vec<(usize, f64)> = series
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect();

        let insufficient = BandError::InsufficientData {
            required: self.period.max(1),
            available: complete.len(),
        };
        if self.period == 0 || complete.len() < self.period {
            return Err(insufficient);
        }
        let Some(&(last, average)) = defined.last() else {
            return Err(insufficient);
        };
        let latest_close = complete[last].close;

        tracing::info!(
            "{} {} average: {:.4}, last close: {:.4}",
            self.average_type,
            self.period,
            average,
            latest_close
        );

        Ok(EnvelopeBands::from_average(average, latest_close, &self.envelopes))
    }
}
