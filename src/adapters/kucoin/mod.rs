//! KuCoin Futures Adapter
//!
//! REST implementation of `ExchangePort`:
//! - `auth`: API key v2 request signing
//! - `client`: signed HTTP client with rate-limit backoff
//! - `types`: wire formats, symbol mapping and tick-size price formatting

pub mod auth;
pub mod client;
pub mod types;

pub use auth::KucoinAuth;
pub use client::{KucoinClient, KucoinConfig, LIVE_URL, SANDBOX_URL};

use std::time::Duration;

use crate::config::loader::ExchangeSection;

impl From<&ExchangeSection> for KucoinConfig {
    fn from(section: &ExchangeSection) -> Self {
        let base = if section.sandbox {
            KucoinConfig::sandbox()
        } else {
            KucoinConfig::default()
        };
        KucoinConfig {
            timeout: Duration::from_secs(section.timeout_secs),
            max_retries: section.max_retries,
            retry_base_delay_ms: section.retry_base_delay_ms,
            ..base
        }
    }
}
