//! Moving Averages
//!
//! Rolling centre lines over closes (SMA, EMA, WMA) or highs/lows (Donchian midpoint).
//! Each series is aligned with its input; the first `period - 1` values are undefined.

use crate::ports::market_data::Ohlcv;
use crate::strategy::params::AverageType;

/// Simple moving average series
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, value) in values.iter().enumerate() {
        sum += value;
        if i >= period {
            sum -= values[i - period];
        }
        out.push(if i + 1 >= period { Some(sum / period as f64) } else { None });
    }
    out
}

/// Exponential moving average series, seeded with the SMA of the first window
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(current);
    for i in period..values.len() {
        current = (values[i] - current) * alpha + current;
        out[i] = Some(current);
    }
    out
}

/// Linearly weighted moving average series, newest value weighted `period`
pub fn wma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let denominator = (period * (period + 1)) as f64 / 2.0;
    for end in period - 1..values.len() {
        let window = &values[end + 1 - period..=end];
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(i, v)| v * (i + 1) as f64)
            .sum();
        out[end] = Some(weighted / denominator);
    }
    out
}

/// Donchian channel midpoint: (highest high + lowest low) / 2 over the window
pub fn donchian_mid(highs: &[f64], lows: &[f64], period: usize) -> Vec<Option<f64>> {
    let len = highs.len().min(lows.len());
    let mut out = vec![None; len];
    if period == 0 || len < period {
        return out;
    }

    for end in period - 1..len {
        let start = end + 1 - period;
        let upper = highs[start..=end].iter().copied().fold(f64::MIN, f64::max);
        let lower = lows[start..=end].iter().copied().fold(f64::MAX, f64::min);
        out[end] = Some((upper + lower) / 2.0);
    }
    out
}

/// Average series for the configured method over a candle series
pub fn average_series(candles: &[Ohlcv], average_type: AverageType, period: usize) -> Vec<Option<f64>> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    match average_type {
        AverageType::Sma => sma(&closes, period),
        AverageType::Ema => ema(&closes, period),
        AverageType::Wma => wma(&closes, period),
        AverageType::DonchianMid => {
            let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
            let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
            donchian_mid(&highs, &lows, period)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = [100.0, 102.0, 104.0, 106.0, 108.0];
        let series = sma(&values, 5);
        assert_eq!(series[..4], [None, None, None, None]);
        assert_relative_eq!(series[4].unwrap(), 104.0);

        let series = sma(&values, 2);
        assert_relative_eq!(series[1].unwrap(), 101.0);
        assert_relative_eq!(series[4].unwrap(), 107.0);
    }

    #[test]
    fn test_sma_insufficient_data() {
        let series = sma(&[100.0, 102.0], 5);
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn test_ema() {
        let values = [100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let series = ema(&values, 5);
        assert!(series[3].is_none());
        assert_relative_eq!(series[4].unwrap(), 104.0);
        // alpha = 1/3: 104 + (110 - 104) / 3
        assert_relative_eq!(series[5].unwrap(), 106.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wma() {
        let values = [1.0, 2.0, 3.0];
        let series = wma(&values, 3);
        // (1*1 + 2*2 + 3*3) / 6
        assert_relative_eq!(series[2].unwrap(), 14.0 / 6.0, epsilon = 1e-12);
        assert!(series[1].is_none());
    }

    #[test]
    fn test_donchian_mid() {
        let highs = [10.0, 12.0, 11.0, 15.0];
        let lows = [8.0, 9.0, 7.0, 10.0];
        let series = donchian_mid(&highs, &lows, 3);
        assert!(series[1].is_none());
        assert_relative_eq!(series[2].unwrap(), (12.0 + 7.0) / 2.0);
        assert_relative_eq!(series[3].unwrap(), (15.0 + 7.0) / 2.0);
    }

    #[test]
    fn test_zero_period_is_undefined() {
        assert!(sma(&[1.0, 2.0], 0).iter().all(Option::is_none));
        assert!(ema(&[1.0, 2.0], 0).iter().all(Option::is_none));
        assert!(wma(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }
}
