//! Configuration Loader
//!
//! Loads and validates the bot's TOML configuration. API credentials never live
//! in the file; they come from the environment (optionally via `.env`).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::application::RunSettings;
use crate::ports::market_data::Timeframe;
use crate::strategy::params::{
    AverageType, EnvelopeConfig, MarginMode, StopPriceType, DEFAULT_OHLCV_HISTORY, DEFAULT_TRIGGER_PRICE_DELTA,
};

pub const API_KEY_ENV: &str = "KUCOIN_API_KEY";
pub const API_SECRET_ENV: &str = "KUCOIN_API_SECRET";
pub const API_PASSPHRASE_ENV: &str = "KUCOIN_API_PASSPHRASE";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub market: MarketSection,
    pub strategy: StrategySection,
    #[serde(default)]
    pub exchange: ExchangeSection,
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Traded contract and account settings
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSection {
    /// Unified symbol, e.g. "BTC/USDT:USDT"
    pub symbol: String,
    /// Candle timeframe ("1h", "4h", ...)
    pub timeframe: Timeframe,
    pub margin_mode: MarginMode,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
}

/// Envelope strategy section
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    pub average_type: AverageType,
    pub average_period: usize,
    /// Band offsets, tightest first (0.07 = 7%)
    pub envelopes: Vec<f64>,
    pub stop_loss_pct: f64,
    /// Emergency close distance; omit to disable
    #[serde(default)]
    pub price_jump_pct: Option<f64>,
    #[serde(default = "default_true")]
    pub use_longs: bool,
    #[serde(default = "default_true")]
    pub use_shorts: bool,
    /// Fraction of free balance spread across the levels
    pub balance_fraction: f64,
    #[serde(default = "default_stop_price_type")]
    pub stop_price_type: StopPriceType,
    #[serde(default = "default_trigger_price_delta")]
    pub trigger_price_delta: f64,
    #[serde(default = "default_ohlcv_history")]
    pub ohlcv_history: usize,
}

/// Exchange connection section
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSection {
    /// Use the KuCoin futures sandbox
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            sandbox: false,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSection {
    /// Directory holding one tracker file per symbol
    #[serde(default = "default_tracker_dir")]
    pub dir: String,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            dir: default_tracker_dir(),
        }
    }
}

impl TrackerSection {
    /// Tracker directory with `~` expanded
    pub fn resolved_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).into_owned())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Unset falls back to `RUST_LOG`.
    #[serde(default)]
    pub level: Option<String>,
}

fn default_leverage() -> u32 {
    1
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

fn default_true() -> bool {
    true
}

fn default_stop_price_type() -> StopPriceType {
    StopPriceType::MarkPrice
}

fn default_trigger_price_delta() -> f64 {
    DEFAULT_TRIGGER_PRICE_DELTA
}

fn default_ohlcv_history() -> usize {
    DEFAULT_OHLCV_HISTORY
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_tracker_dir() -> String {
    ".".to_string()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.market.symbol.trim().is_empty() {
            return Err(ConfigError::ValidationError("symbol cannot be empty".to_string()));
        }

        if self.market.leverage == 0 {
            return Err(ConfigError::ValidationError(format!(
                "leverage must be >= 1, got {}",
                self.market.leverage
            )));
        }

        if self.market.quote_currency.is_empty() {
            return Err(ConfigError::ValidationError(
                "quote_currency cannot be empty".to_string(),
            ));
        }

        EnvelopeConfig::from(self)
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.exchange.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "max_retries must be > 0".to_string(),
            ));
        }

        if self.exchange.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Tracker file location for the configured symbol
    pub fn tracker_path(&self) -> PathBuf {
        self.tracker
            .resolved_dir()
            .join(crate::domain::tracker_file_name(&self.market.symbol))
    }
}

impl From<&Config> for EnvelopeConfig {
    fn from(config: &Config) -> Self {
        let s = &config.strategy;
        EnvelopeConfig {
            average_type: s.average_type,
            average_period: s.average_period,
            envelopes: s.envelopes.clone(),
            stop_loss_pct: s.stop_loss_pct,
            price_jump_pct: s.price_jump_pct,
            use_longs: s.use_longs,
            use_shorts: s.use_shorts,
            balance_fraction: s.balance_fraction,
            trigger_price_delta: s.trigger_price_delta,
            stop_price_type: s.stop_price_type,
            ohlcv_history: s.ohlcv_history,
        }
    }
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        RunSettings {
            symbol: config.market.symbol.clone(),
            timeframe: config.market.timeframe,
            margin_mode: config.market.margin_mode,
            leverage: config.market.leverage,
            quote_currency: config.market.quote_currency.clone(),
        }
    }
}

/// API credentials read from the environment
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .field("passphrase", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };
        Ok(Self {
            api_key: get(API_KEY_ENV)?,
            api_secret: get(API_SECRET_ENV)?,
            passphrase: get(API_PASSPHRASE_ENV)?,
        })
    }
}
