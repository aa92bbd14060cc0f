//! Resume Gate
//!
//! After a stop-loss or kill-switch exit, new entries stay paused until price
//! crosses back through the moving average on the side that lost.

use super::position::PositionSide;
use super::tracker::TrackerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Status already allows trading
    Open,
    /// Paused status cleared this cycle
    Resume,
    /// Still paused, no order activity this cycle
    Blocked,
}

/// Decide whether entries are permitted given the latest close and the current average
pub fn evaluate(state: &TrackerState, latest_close: f64, average: f64) -> GateDecision {
    if state.status.can_trade() {
        return GateDecision::Open;
    }

    let crossed = match state.last_side {
        Some(PositionSide::Long) => latest_close >= average,
        Some(PositionSide::Short) => latest_close <= average,
        None => false,
    };

    if crossed {
        GateDecision::Resume
    } else {
        GateDecision::Blocked
    }
}
