//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - KuCoin: perpetual-futures REST client
//! - CLI: Command-line interface definitions

pub mod cli;
pub mod kucoin;

pub use cli::CliApp;
pub use kucoin::{KucoinClient, KucoinConfig};
