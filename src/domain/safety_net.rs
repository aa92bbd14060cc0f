//! Safety Net
//!
//! Single-open-position invariant and the optional price-jump kill switch.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::position::{Position, PositionSide};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyNetError {
    #[error("{0} positions remain open after cleanup, refusing to guess which one to manage")]
    AmbiguousPositions(usize),
}

/// Outcome of the kill-switch check for one open position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceJumpCheck {
    /// No threshold configured
    Disabled,
    /// Entry price unusable, check skipped
    Skipped,
    Within { threshold: f64 },
    Breached { threshold: f64 },
}

impl PriceJumpCheck {
    pub fn is_breached(&self) -> bool {
        matches!(self, PriceJumpCheck::Breached { .. })
    }
}

/// Positions split into the one to keep and the ones to close
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTriage {
    pub keep: Option<Position>,
    pub close: Vec<Position>,
}

#[derive(Debug, Clone, Default)]
pub struct SafetyNet {
    price_jump_pct: Option<f64>,
}

impl SafetyNet {
    pub fn new(price_jump_pct: Option<f64>) -> Self {
        Self { price_jump_pct }
    }

    /// Keep the most recently opened position and mark the rest for closure.
    /// Positions without an open timestamp sort as oldest.
    pub fn triage(&self, mut positions: Vec<Position>) -> PositionTriage {
        if positions.len() <= 1 {
            return PositionTriage {
                keep: positions.pop(),
                close: Vec::new(),
            };
        }

        positions.sort_by_key(|p| std::cmp::Reverse(p.opened_at.unwrap_or(DateTime::<Utc>::MIN_UTC)));
        let keep = positions.remove(0);
        PositionTriage {
            keep: Some(keep),
            close: positions,
        }
    }

    /// Collapse a re-fetched position list to at most one, or fail
    pub fn single(&self, mut positions: Vec<Position>) -> Result<Option<Position>, SafetyNetError> {
        match positions.len() {
            0 | 1 => Ok(positions.pop()),
            n => Err(SafetyNetError::AmbiguousPositions(n)),
        }
    }

    /// Compare the latest close against the entry price moved by `price_jump_pct` against the position
    pub fn check_price_jump(&self, position: &Position, latest_close: f64) -> PriceJumpCheck {
        let Some(pct) = self.price_jump_pct else {
            return PriceJumpCheck::Disabled;
        };
        if position.entry_price == 0.0 {
            return PriceJumpCheck::Skipped;
        }

        match position.side {
            PositionSide::Long => {
                let threshold = position.entry_price * (1.0 - pct);
                if latest_close < threshold {
                    PriceJumpCheck::Breached { threshold }
                } else {
                    PriceJumpCheck::Within { threshold }
                }
            }
            PositionSide::Short => {
                let threshold = position.entry_price * (1.0 + pct);
                if latest_close > threshold {
                    PriceJumpCheck::Breached { threshold }
                } else {
                    PriceJumpCheck::Within { threshold }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn position_at(side: PositionSide, hour: u32) -> Position {
        Position::new("BTC/USDT:USDT", side, 100.0, 5.0)
            .with_opened_at(Utc.with_ymd_and_hms(2026, 1, 5, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_triage_single_position() {
        let net = SafetyNet::default();
        let position = position_at(PositionSide::Long, 1);
        let triage = net.triage(vec![position.clone()]);
        assert_eq!(triage.keep, Some(position));
        assert!(triage.close.is_empty());
    }

    #[test]
    fn test_triage_empty() {
        let triage = SafetyNet::default().triage(Vec::new());
        assert!(triage.keep.is_none());
        assert!(triage.close.is_empty());
    }

    #[test]
    fn test_triage_keeps_latest() {
        let net = SafetyNet::default();
        let older = position_at(PositionSide::Long, 1);
        let newest = position_at(PositionSide::Short, 9);
        let middle = position_at(PositionSide::Long, 5);

        let triage = net.triage(vec![older.clone(), newest.clone(), middle.clone()]);
        assert_eq!(triage.keep, Some(newest));
        assert_eq!(triage.close, vec![middle, older]);
    }

    #[test]
    fn test_triage_missing_timestamp_is_oldest() {
        let net = SafetyNet::default();
        let undated = Position::new("BTC/USDT:USDT", PositionSide::Long, 100.0, 1.0);
        let dated = position_at(PositionSide::Short, 2);

        let triage = net.triage(vec![undated.clone(), dated.clone()]);
        assert_eq!(triage.keep, Some(dated));
        assert_eq!(triage.close, vec![undated]);
    }

    #[test]
    fn test_single_rejects_ambiguity() {
        let net = SafetyNet::default();
        let positions = vec![position_at(PositionSide::Long, 1), position_at(PositionSide::Short, 2)];
        assert_eq!(net.single(positions), Err(SafetyNetError::AmbiguousPositions(2)));
        assert_eq!(net.single(Vec::new()), Ok(None));
    }

    #[test]
    fn test_price_jump_disabled() {
        let net = SafetyNet::new(None);
        let position = position_at(PositionSide::Long, 1);
        assert_eq!(net.check_price_jump(&position, 1.0), PriceJumpCheck::Disabled);
    }

    #[test]
    fn test_price_jump_long() {
        let net = SafetyNet::new(Some(0.25));
        let position = position_at(PositionSide::Long, 1);

        // threshold = 75
        assert!(net.check_price_jump(&position, 74.9).is_breached());
        assert!(!net.check_price_jump(&position, 75.0).is_breached());
        assert!(!net.check_price_jump(&position, 125.0).is_breached());
    }

    #[test]
    fn test_price_jump_short() {
        let net = SafetyNet::new(Some(0.25));
        let position = position_at(PositionSide::Short, 1);

        // threshold = 125
        assert!(net.check_price_jump(&position, 125.1).is_breached());
        assert!(!net.check_price_jump(&position, 125.0).is_breached());
        assert!(!net.check_price_jump(&position, 50.0).is_breached());
    }

    #[test]
    fn test_price_jump_zero_entry_skipped() {
        let net = SafetyNet::new(Some(0.25));
        let position = Position::new("BTC/USDT:USDT", PositionSide::Long, 0.0, 1.0);
        assert_eq!(net.check_price_jump(&position, 1.0), PriceJumpCheck::Skipped);
    }
}
