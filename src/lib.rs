//! Envelope Bot - mean-reversion envelope bracket executor for perpetual futures
//!
//! Each invocation runs a single reconcile / decide / act / persist cycle for one
//! symbol; the tracker file is the only state carried between invocations.
//!
//! # Modules
//!
//! - `domain`: Core business logic (tracker, positions, orders, safety net, resume gate)
//! - `ports`: Trait abstractions (ExchangePort) and an in-memory exchange for tests
//! - `strategy`: Moving averages and envelope bands
//! - `adapters`: External implementations (KuCoin Futures, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Reconciler, bracket orchestrator and run controller

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod strategy;
