pub mod brackets;
pub mod reconciler;
pub mod run_controller;

pub use brackets::{BracketError, BracketOrchestrator, BracketReport};
pub use reconciler::{OrderReconciler, ReconcileReport};
pub use run_controller::{RunContext, RunController, RunError, RunOutcome, RunSettings};
