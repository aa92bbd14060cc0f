//! Domain Layer - Core business logic for the envelope bot
//!
//! Pure types and decisions with no exchange I/O:
//! - `tracker`: persisted run-to-run state and its atomic file store
//! - `position` / `order`: typed exchange positions, orders and bracket legs
//! - `safety_net`: single-position invariant and price-jump kill switch
//! - `resume_gate`: re-entry hysteresis after a stop-loss or kill-switch exit

pub mod order;
pub mod position;
pub mod resume_gate;
pub mod safety_net;
pub mod tracker;

pub use order::{BracketOrder, ExchangeOrder, OrderRole, OrderSide, OrderStatus, PlacedOrder, TriggerDirection};
pub use position::{Position, PositionError, PositionSide};
pub use resume_gate::GateDecision;
pub use safety_net::{PositionTriage, PriceJumpCheck, SafetyNet, SafetyNetError};
pub use tracker::{tracker_file_name, TrackerError, TrackerState, TrackerStatus, TrackerStore};
