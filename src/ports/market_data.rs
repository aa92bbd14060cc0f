use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),
}

/// OHLCV data structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Account balance for one currency
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub free: f64,
    pub total: f64,
}

/// Candle width, parsed from strings such as `15m`, `1h`, `1d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    minutes: u32,
}

impl Timeframe {
    pub fn from_minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn parse(value: &str) -> Result<Self, MarketDataError> {
        let invalid = || MarketDataError::UnsupportedTimeframe(value.to_string());
        let value = value.trim();
        if value.len() < 2 {
            return Err(invalid());
        }
        let (count, unit) = value.split_at(value.len() - 1);
        let count: u32 = count.parse().map_err(|_| invalid())?;
        let per_unit = match unit {
            "m" => 1,
            "h" => 60,
            "d" => 60 * 24,
            "w" => 60 * 24 * 7,
            _ => return Err(invalid()),
        };
        if count == 0 {
            return Err(invalid());
        }
        Ok(Self::from_minutes(count * per_unit))
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = self.minutes;
        if m % (60 * 24 * 7) == 0 {
            write!(f, "{}w", m / (60 * 24 * 7))
        } else if m % (60 * 24) == 0 {
            write!(f, "{}d", m / (60 * 24))
        } else if m % 60 == 0 {
            write!(f, "{}h", m / 60)
        } else {
            write!(f, "{}m", m)
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = MarketDataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Timeframe::parse(&value)
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeframe() {
        assert_eq!(Timeframe::parse("1h").unwrap().minutes(), 60);
        assert_eq!(Timeframe::parse("15m").unwrap().minutes(), 15);
        assert_eq!(Timeframe::parse("1d").unwrap().minutes(), 1440);
        assert_eq!(Timeframe::parse("4h").unwrap().to_string(), "4h");
        assert_eq!(Timeframe::parse("1w").unwrap().to_string(), "1w");
    }

    #[test]
    fn test_invalid_timeframe() {
        assert!(Timeframe::parse("h").is_err());
        assert!(Timeframe::parse("0m").is_err());
        assert!(Timeframe::parse("5y").is_err());
        assert!(Timeframe::parse("").is_err());
    }

    #[test]
    fn test_timeframe_serde() {
        let tf: Timeframe = serde_json::from_str("\"30m\"").unwrap();
        assert_eq!(tf.minutes(), 30);
        assert_eq!(serde_json::to_string(&tf).unwrap(), "\"30m\"");
    }
}
