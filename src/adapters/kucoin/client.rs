//! KuCoin Futures REST Client
//!
//! Signed HTTP client implementing `ExchangePort` against the KuCoin Futures API.
//! Rate limits (HTTP 429 or envelope code 429000) are retried with exponential
//! backoff; server errors and transport failures with a linear one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use super::auth::KucoinAuth;
use super::types::{
    format_price, parse_klines, to_venue_symbol, AccountOverview, Ack, ApiResponse, ContractInfo, OrderAck,
    OrderItem, OrderRequest, Page, PositionItem, RATE_LIMIT_CODE,
};
use crate::config::Credentials;
use crate::domain::{BracketOrder, ExchangeOrder, PlacedOrder, Position, TriggerDirection};
use crate::ports::exchange::{ExchangeError, ExchangePort};
use crate::ports::market_data::{Balance, Ohlcv, Timeframe};
use crate::strategy::params::{MarginMode, StopPriceType};

pub const LIVE_URL: &str = "https://api-futures.kucoin.com";
pub const SANDBOX_URL: &str = "https://api-sandbox-futures.kucoin.com";

/// Closed orders are scanned newest first, at most this many pages deep
const CLOSED_ORDER_PAGES: u32 = 5;
const CLOSED_ORDER_PAGE_SIZE: u32 = 100;

/// KuCoin client configuration
#[derive(Debug, Clone)]
pub struct KucoinConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Number of attempts per request
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Margin mode stamped on orders until `set_margin_mode` changes it
    pub margin_mode: MarginMode,
    /// Leverage stamped on orders until `set_leverage` changes it
    pub leverage: u32,
}

impl Default for KucoinConfig {
    fn default() -> Self {
        Self {
            base_url: LIVE_URL.to_string(),
            timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_base_delay_ms: 500,
            margin_mode: MarginMode::Isolated,
            leverage: 1,
        }
    }
}

impl KucoinConfig {
    pub fn sandbox() -> Self {
        Self {
            base_url: SANDBOX_URL.to_string(),
            ..Self::default()
        }
    }

    /// Account settings the traded position uses
    pub fn with_margin(mut self, margin_mode: MarginMode, leverage: u32) -> Self {
        self.margin_mode = margin_mode;
        self.leverage = leverage.max(1);
        self
    }
}

/// How long to wait before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^(attempt + 1)`, for rate limits
    Exponential,
    /// `base * (attempt + 1)`, for server and transport errors
    Linear,
}

impl Backoff {
    pub fn delay(&self, base_ms: u64, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential => Duration::from_millis(base_ms * 2u64.pow(attempt + 1)),
            Backoff::Linear => Duration::from_millis(base_ms * (attempt as u64 + 1)),
        }
    }
}

/// Result of one HTTP attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    /// Body of a response worth parsing
    Done(String),
    Retry { error: ExchangeError, backoff: Backoff },
    Fail(ExchangeError),
}

/// Classify a received response
pub fn classify_response(status: StatusCode, text: String, endpoint: &str) -> Attempt {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Attempt::Retry {
            error: ExchangeError::RateLimited(endpoint.to_string()),
            backoff: Backoff::Exponential,
        };
    }
    if status.is_server_error() {
        return Attempt::Retry {
            error: ExchangeError::api(status.as_str(), format!("Server error on {}", endpoint)),
            backoff: Backoff::Linear,
        };
    }

    match serde_json::from_str::<Ack>(&text) {
        Ok(ack) if ack.code == RATE_LIMIT_CODE => Attempt::Retry {
            error: ExchangeError::RateLimited(ack.msg.unwrap_or_else(|| endpoint.to_string())),
            backoff: Backoff::Exponential,
        },
        Ok(_) => Attempt::Done(text),
        Err(_) if status == StatusCode::UNAUTHORIZED => Attempt::Fail(ExchangeError::Authentication(text)),
        Err(_) if !status.is_success() => Attempt::Fail(ExchangeError::api(status.as_str(), text)),
        Err(e) => Attempt::Fail(ExchangeError::Parse(format!("{}: {}", e, text))),
    }
}

/// Drive `send` until it yields a final answer or `max_retries` attempts are spent
pub async fn with_retries<F, Fut>(config: &KucoinConfig, endpoint: &str, mut send: F) -> Result<String, ExchangeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut last_error = None;

    for attempt in 0..config.max_retries {
        match send(attempt).await {
            Attempt::Done(text) => return Ok(text),
            Attempt::Fail(error) => return Err(error),
            Attempt::Retry { error, backoff } => {
                tracing::warn!("{} failed: {} (attempt {}/{})", endpoint, error, attempt + 1, config.max_retries);
                last_error = Some(error);
                if attempt + 1 < config.max_retries {
                    tokio::time::sleep(backoff.delay(config.retry_base_delay_ms, attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ExchangeError::Network(format!("No attempts made for {}", endpoint))))
}

pub struct KucoinClient {
    config: KucoinConfig,
    http: Client,
    auth: KucoinAuth,
    contracts: RwLock<HashMap<String, ContractInfo>>,
    leverage: AtomicU32,
    cross_margin: AtomicBool,
}

impl KucoinClient {
    pub fn new(config: KucoinConfig, credentials: Credentials) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            leverage: AtomicU32::new(config.leverage.max(1)),
            cross_margin: AtomicBool::new(config.margin_mode == MarginMode::Cross),
            config,
            http,
            auth: KucoinAuth::new(credentials),
            contracts: RwLock::new(HashMap::new()),
        })
    }

    /// Send a signed request, retrying rate limits and transient failures.
    /// Returns the raw body of the first non-retryable response.
    async fn execute_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, ExchangeError> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let body_text = match body {
            Some(body) => serde_json::to_string(body).map_err(|e| ExchangeError::InvalidRequest(e.to_string()))?,
            None => String::new(),
        };

        with_retries(&self.config, endpoint, |attempt| {
            tracing::debug!("{} {} (attempt {})", method, endpoint, attempt + 1);
            let timestamp = Utc::now().timestamp_millis();
            let request = self
                .auth
                .headers(timestamp, method.as_str(), endpoint, &body_text)
                .map(|headers| {
                    let req = self.http.request(method.clone(), &url).headers(headers);
                    match body {
                        Some(_) => req.header(CONTENT_TYPE, "application/json").body(body_text.clone()),
                        None => req,
                    }
                });

            async move {
                let req = match request {
                    Ok(req) => req,
                    Err(e) => return Attempt::Fail(e),
                };
                match req.send().await {
                    Ok(response) => {
                        let status = response.status();
                        match response.text().await {
                            Ok(text) => classify_response(status, text, endpoint),
                            Err(e) => Attempt::Fail(ExchangeError::Network(e.to_string())),
                        }
                    }
                    Err(e) => Attempt::Retry {
                        error: ExchangeError::Network(e.to_string()),
                        backoff: Backoff::Linear,
                    },
                }
            }
        })
        .await
    }

    /// Margin mode and leverage to stamp on the next order
    fn order_margin(&self) -> (MarginMode, u32) {
        let margin_mode = if self.cross_margin.load(Ordering::Relaxed) {
            MarginMode::Cross
        } else {
            MarginMode::Isolated
        };
        (margin_mode, self.leverage.load(Ordering::Relaxed))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ExchangeError> {
        let text = self.execute_request(method, endpoint, body).await?;
        let response: ApiResponse<T> =
            serde_json::from_str(&text).map_err(|e| ExchangeError::Parse(format!("{}: {}", e, text)))?;
        response.into_result()
    }

    async fn request_ack(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(), ExchangeError> {
        let text = self.execute_request(method, endpoint, body).await?;
        let ack: Ack = serde_json::from_str(&text).map_err(|e| ExchangeError::Parse(format!("{}: {}", e, text)))?;
        ack.into_result()
    }

    /// Contract metadata, cached for the lifetime of the client
    async fn contract(&self, symbol: &str) -> Result<ContractInfo, ExchangeError> {
        let venue = to_venue_symbol(symbol);
        if let Some(info) = self.contracts.read().await.get(&venue) {
            return Ok(info.clone());
        }

        let info: ContractInfo = self
            .request(Method::GET, &format!("/api/v1/contracts/{}", venue), None)
            .await?;
        tracing::debug!(
            "Contract {}: multiplier={:?}, lot={:?}, tick={:?}",
            info.symbol,
            info.multiplier,
            info.lot_size,
            info.tick_size
        );
        self.contracts.write().await.insert(venue, info.clone());
        Ok(info)
    }

    async fn list_orders(&self, endpoint: &str) -> Result<Vec<OrderItem>, ExchangeError> {
        let page: Page<OrderItem> = self.request(Method::GET, endpoint, None).await?;
        Ok(page.items)
    }

    async fn cancel(&self, id: &str) -> Result<(), ExchangeError> {
        self.request_ack(Method::DELETE, &format!("/api/v1/orders/{}", id), None)
            .await
    }

    async fn place_trigger(
        &self,
        symbol: &str,
        order: &BracketOrder,
        stop_price_type: StopPriceType,
        limit: bool,
    ) -> Result<PlacedOrder, ExchangeError> {
        let contract = self.contract(symbol).await?;
        let (margin_mode, leverage) = self.order_margin();
        let request = build_trigger_order(&contract, order, stop_price_type, limit, leverage, margin_mode)?;
        let body = serde_json::to_value(&request).map_err(|e| ExchangeError::InvalidRequest(e.to_string()))?;

        let ack: OrderAck = self.request(Method::POST, "/api/v1/orders", Some(&body)).await?;
        Ok(PlacedOrder { id: ack.order_id })
    }
}

fn client_oid() -> String {
    let nonce: u64 = rand::thread_rng().gen();
    format!("{}{:016x}", Utc::now().timestamp_millis(), nonce)
}

/// Order body for a trigger order placing `order` on `contract`
pub fn build_trigger_order(
    contract: &ContractInfo,
    order: &BracketOrder,
    stop_price_type: StopPriceType,
    limit: bool,
    leverage: u32,
    margin_mode: MarginMode,
) -> Result<OrderRequest, ExchangeError> {
    if order.amount == 0 {
        return Err(ExchangeError::InvalidRequest("order amount is zero".to_string()));
    }

    let price = if limit {
        let limit_price = order
            .limit_price
            .ok_or_else(|| ExchangeError::InvalidRequest("trigger-limit order needs a limit price".to_string()))?;
        Some(format_price(limit_price, contract.tick_size)?)
    } else {
        None
    };

    Ok(OrderRequest {
        client_oid: client_oid(),
        symbol: contract.symbol.clone(),
        order_type: if limit { "limit" } else { "market" },
        side: Some(order.side.as_str()),
        price,
        size: Some(order.amount),
        leverage: Some(leverage.max(1).to_string()),
        stop: Some(match order.trigger_direction {
            TriggerDirection::Falling => "down",
            TriggerDirection::Rising => "up",
        }),
        stop_price_type: Some(stop_price_type.code()),
        stop_price: Some(format_price(order.trigger_price, contract.tick_size)?),
        reduce_only: Some(order.reduce_only),
        close_order: None,
        margin_mode: Some(match margin_mode {
            MarginMode::Isolated => "ISOLATED",
            MarginMode::Cross => "CROSS",
        }),
    })
}

/// `(from, to)` in milliseconds covering `limit` candles ending now
pub fn kline_window(now_ms: i64, timeframe: Timeframe, limit: usize) -> (i64, i64) {
    let span = timeframe.minutes() as i64 * 60_000 * limit as i64;
    (now_ms - span, now_ms)
}

#[async_trait]
impl ExchangePort for KucoinClient {
    async fn contract_size(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.contract(symbol)
            .await?
            .multiplier
            .ok_or_else(|| ExchangeError::Parse(format!("contract {} has no multiplier", symbol)))
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        let endpoint = format!("/api/v1/orders?status=active&symbol={}", to_venue_symbol(symbol));
        self.list_orders(&endpoint)
            .await?
            .into_iter()
            .map(OrderItem::into_order)
            .collect()
    }

    async fn cancel_order(&self, id: &str, _symbol: &str) -> Result<(), ExchangeError> {
        self.cancel(id).await
    }

    async fn fetch_open_trigger_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        let endpoint = format!("/api/v1/stopOrders?symbol={}", to_venue_symbol(symbol));
        self.list_orders(&endpoint)
            .await?
            .into_iter()
            .map(OrderItem::into_order)
            .collect()
    }

    async fn cancel_trigger_order(&self, id: &str, _symbol: &str) -> Result<(), ExchangeError> {
        self.cancel(id).await
    }

    async fn fetch_closed_trigger_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        let venue = to_venue_symbol(symbol);
        let mut items: Vec<OrderItem> = Vec::new();
        for page_number in 1..=CLOSED_ORDER_PAGES {
            let endpoint = format!(
                "/api/v1/orders?status=done&symbol={}&currentPage={}&pageSize={}",
                venue, page_number, CLOSED_ORDER_PAGE_SIZE
            );
            let page: Page<OrderItem> = self.request(Method::GET, &endpoint, None).await?;
            let last_page = page.is_last(page_number);
            items.extend(page.items.into_iter().filter(OrderItem::is_trigger_order));
            if last_page {
                break;
            }
        }
        items.sort_by_key(|o| o.created_at.unwrap_or(0));
        items.into_iter().map(OrderItem::into_order).collect()
    }

    async fn fetch_open_positions(&self, symbol: &str) -> Result<Vec<Position>, ExchangeError> {
        let venue = to_venue_symbol(symbol);
        let items: Vec<PositionItem> = self.request(Method::GET, "/api/v1/positions", None).await?;
        Ok(items
            .into_iter()
            .filter(|p| p.symbol == venue)
            .filter_map(|p| p.into_position(symbol))
            .collect())
    }

    async fn close_position(&self, position: &Position) -> Result<(), ExchangeError> {
        let request = OrderRequest {
            client_oid: client_oid(),
            symbol: to_venue_symbol(&position.symbol),
            order_type: "market",
            side: None,
            price: None,
            size: None,
            leverage: None,
            stop: None,
            stop_price_type: None,
            stop_price: None,
            reduce_only: None,
            close_order: Some(true),
            margin_mode: None,
        };
        let body = serde_json::to_value(&request).map_err(|e| ExchangeError::InvalidRequest(e.to_string()))?;
        let ack: OrderAck = self.request(Method::POST, "/api/v1/orders", Some(&body)).await?;
        tracing::info!("Close order {} sent for {} {}", ack.order_id, position.side, position.symbol);
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<(), ExchangeError> {
        self.cross_margin.store(mode == MarginMode::Cross, Ordering::Relaxed);
        let body = serde_json::json!({
            "symbol": to_venue_symbol(symbol),
            "marginMode": mode.as_str().to_uppercase(),
        });
        self.request_ack(Method::POST, "/api/v2/position/changeMarginMode", Some(&body))
            .await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32, mode: MarginMode) -> Result<(), ExchangeError> {
        self.leverage.store(leverage.max(1), Ordering::Relaxed);
        match mode {
            // isolated leverage travels with each order
            MarginMode::Isolated => Ok(()),
            MarginMode::Cross => {
                let body = serde_json::json!({
                    "symbol": to_venue_symbol(symbol),
                    "leverage": leverage.to_string(),
                });
                self.request_ack(Method::POST, "/api/v2/changeCrossUserLeverage", Some(&body))
                    .await
            }
        }
    }

    async fn fetch_balance(&self, currency: &str) -> Result<Balance, ExchangeError> {
        let endpoint = format!("/api/v1/account-overview?currency={}", currency);
        let overview: AccountOverview = self.request(Method::GET, &endpoint, None).await?;
        let free = overview.available_balance.unwrap_or(0.0);
        Ok(Balance {
            free,
            total: overview.account_equity.unwrap_or(free),
        })
    }

    async fn fetch_min_amount_tradable(&self, symbol: &str) -> Result<f64, ExchangeError> {
        Ok(self.contract(symbol).await?.lot_size.unwrap_or(1.0))
    }

    async fn fetch_recent_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, ExchangeError> {
        let (from, to) = kline_window(Utc::now().timestamp_millis(), timeframe, limit);
        let endpoint = format!(
            "/api/v1/kline/query?symbol={}&granularity={}&from={}&to={}",
            to_venue_symbol(symbol),
            timeframe.minutes(),
            from,
            to
        );
        let rows: Vec<Vec<serde_json::Value>> = self.request(Method::GET, &endpoint, None).await?;
        let mut candles = parse_klines(rows)?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    async fn place_trigger_limit_order(
        &self,
        symbol: &str,
        order: &BracketOrder,
        stop_price_type: StopPriceType,
    ) -> Result<PlacedOrder, ExchangeError> {
        self.place_trigger(symbol, order, stop_price_type, true).await
    }

    async fn place_trigger_market_order(
        &self,
        symbol: &str,
        order: &BracketOrder,
        stop_price_type: StopPriceType,
    ) -> Result<PlacedOrder, ExchangeError> {
        self.place_trigger(symbol, order, stop_price_type, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderSide;
    use std::collections::VecDeque;

    fn contract() -> ContractInfo {
        ContractInfo {
            symbol: "XBTUSDTM".to_string(),
            multiplier: Some(0.001),
            lot_size: Some(1.0),
            tick_size: Some(0.1),
        }
    }

    #[test]
    fn test_default_config() {
        let config = KucoinConfig::default();
        assert_eq!(config.base_url, LIVE_URL);
        assert_eq!(KucoinConfig::sandbox().base_url, SANDBOX_URL);
        assert_eq!(config.max_retries, 3);
    }

    fn credentials() -> Credentials {
        Credentials {
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            passphrase: "p".to_string(),
        }
    }

    fn instant_retries(max_retries: u32) -> KucoinConfig {
        KucoinConfig {
            max_retries,
            retry_base_delay_ms: 0,
            ..KucoinConfig::default()
        }
    }

    fn rate_limited() -> Attempt {
        Attempt::Retry {
            error: ExchangeError::RateLimited("/api/v1/orders".to_string()),
            backoff: Backoff::Exponential,
        }
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(Backoff::Exponential.delay(100, 0), Duration::from_millis(200));
        assert_eq!(Backoff::Exponential.delay(100, 2), Duration::from_millis(800));
        assert_eq!(Backoff::Linear.delay(100, 0), Duration::from_millis(100));
        assert_eq!(Backoff::Linear.delay(100, 1), Duration::from_millis(200));
    }

    #[test]
    fn test_http_429_is_retried_exponentially() {
        let attempt = classify_response(StatusCode::TOO_MANY_REQUESTS, String::new(), "/api/v1/orders");
        assert_eq!(
            attempt,
            Attempt::Retry {
                error: ExchangeError::RateLimited("/api/v1/orders".to_string()),
                backoff: Backoff::Exponential,
            }
        );
    }

    #[test]
    fn test_envelope_rate_limit_is_retried_exponentially() {
        let body = r#"{"code":"429000","msg":"Too Many Requests"}"#.to_string();
        let attempt = classify_response(StatusCode::OK, body, "/api/v1/orders");
        assert_eq!(
            attempt,
            Attempt::Retry {
                error: ExchangeError::RateLimited("Too Many Requests".to_string()),
                backoff: Backoff::Exponential,
            }
        );
    }

    #[test]
    fn test_server_error_is_retried_linearly() {
        let attempt = classify_response(StatusCode::SERVICE_UNAVAILABLE, "down".to_string(), "/api/v1/positions");
        match attempt {
            Attempt::Retry { error, backoff } => {
                assert_eq!(backoff, Backoff::Linear);
                assert!(matches!(error, ExchangeError::Api { ref code, .. } if code == "503"));
            }
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_final_responses_are_not_retried() {
        let ok = r#"{"code":"200000","data":{"orderId":"abc"}}"#.to_string();
        assert_eq!(classify_response(StatusCode::OK, ok.clone(), "/x"), Attempt::Done(ok));

        let auth = classify_response(StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), "/x");
        assert!(matches!(auth, Attempt::Fail(ExchangeError::Authentication(_))));

        let missing = classify_response(StatusCode::NOT_FOUND, "no route".to_string(), "/x");
        assert!(matches!(missing, Attempt::Fail(ExchangeError::Api { .. })));

        let garbage = classify_response(StatusCode::OK, "<html>".to_string(), "/x");
        assert!(matches!(garbage, Attempt::Fail(ExchangeError::Parse(_))));
    }

    #[tokio::test]
    async fn test_retries_until_a_response_lands() {
        let mut script = VecDeque::from(vec![
            rate_limited(),
            Attempt::Retry {
                error: ExchangeError::Network("connection reset".to_string()),
                backoff: Backoff::Linear,
            },
            Attempt::Done("body".to_string()),
        ]);
        let mut calls = 0;

        let result = with_retries(&instant_retries(3), "/api/v1/orders", |_| {
            calls += 1;
            let next = script.pop_front().unwrap();
            async move { next }
        })
        .await;

        assert_eq!(result, Ok("body".to_string()));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mut calls = 0;

        let result = with_retries(&instant_retries(3), "/api/v1/orders", |_| {
            calls += 1;
            async { rate_limited() }
        })
        .await;

        assert_eq!(result, Err(ExchangeError::RateLimited("/api/v1/orders".to_string())));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_hard_failure_stops_immediately() {
        let mut attempts = Vec::new();

        let result = with_retries(&instant_retries(5), "/api/v1/orders", |attempt| {
            attempts.push(attempt);
            async { Attempt::Fail(ExchangeError::Authentication("invalid KC-API-SIGN".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ExchangeError::Authentication(_))));
        assert_eq!(attempts, vec![0]);
    }

    #[test]
    fn test_orders_use_configured_margin_without_setup_calls() {
        // an open position skips margin setup, so the client must start from the configured values
        let config = KucoinConfig::default().with_margin(MarginMode::Cross, 5);
        let client = KucoinClient::new(config, credentials()).unwrap();
        let (margin_mode, leverage) = client.order_margin();
        assert_eq!((margin_mode, leverage), (MarginMode::Cross, 5));

        let take_profit = BracketOrder::take_profit(OrderSide::Sell, 30000.0, 4);
        let request =
            build_trigger_order(&contract(), &take_profit, StopPriceType::MarkPrice, false, leverage, margin_mode)
                .unwrap();
        assert_eq!(request.margin_mode, Some("CROSS"));
        assert_eq!(request.leverage.as_deref(), Some("5"));
        assert_eq!(request.reduce_only, Some(true));
    }

    #[tokio::test]
    async fn test_isolated_leverage_change_is_local() {
        let client = KucoinClient::new(KucoinConfig::default(), credentials()).unwrap();
        assert_eq!(client.order_margin(), (MarginMode::Isolated, 1));

        client.set_leverage("BTC/USDT:USDT", 7, MarginMode::Isolated).await.unwrap();
        assert_eq!(client.order_margin(), (MarginMode::Isolated, 7));
    }

    #[test]
    fn test_entry_is_trigger_limit() {
        let order = BracketOrder::entry(OrderSide::Buy, 27135.67, 27000.04, 5);
        let request = build_trigger_order(
            &contract(),
            &order,
            StopPriceType::MarkPrice,
            true,
            3,
            MarginMode::Isolated,
        )
        .unwrap();

        assert_eq!(request.order_type, "limit");
        assert_eq!(request.side, Some("buy"));
        assert_eq!(request.price.as_deref(), Some("27000"));
        assert_eq!(request.stop_price.as_deref(), Some("27135.7"));
        assert_eq!(request.stop, Some("down"));
        assert_eq!(request.stop_price_type, Some("MP"));
        assert_eq!(request.reduce_only, Some(false));
        assert_eq!(request.leverage.as_deref(), Some("3"));
        assert_eq!(request.size, Some(5));
        assert!(!request.client_oid.is_empty());
    }

    #[test]
    fn test_stop_loss_is_trigger_market() {
        let order = BracketOrder::stop_loss(OrderSide::Buy, 31000.0, 2);
        let request = build_trigger_order(
            &contract(),
            &order,
            StopPriceType::IndexPrice,
            false,
            1,
            MarginMode::Cross,
        )
        .unwrap();

        assert_eq!(request.order_type, "market");
        assert!(request.price.is_none());
        assert_eq!(request.stop, Some("up"));
        assert_eq!(request.stop_price_type, Some("IP"));
        assert_eq!(request.reduce_only, Some(true));
        assert_eq!(request.margin_mode, Some("CROSS"));
    }

    #[test]
    fn test_limit_order_requires_price() {
        let order = BracketOrder::take_profit(OrderSide::Sell, 100.0, 1);
        let result = build_trigger_order(&contract(), &order, StopPriceType::MarkPrice, true, 1, MarginMode::Isolated);
        assert!(matches!(result, Err(ExchangeError::InvalidRequest(_))));
    }

    #[test]
    fn test_kline_window() {
        let tf = Timeframe::from_minutes(60);
        let (from, to) = kline_window(10_000_000_000, tf, 105);
        assert_eq!(to, 10_000_000_000);
        assert_eq!(to - from, 105 * 3_600_000);
    }

    #[test]
    fn test_client_oids_are_unique() {
        assert_ne!(client_oid(), client_oid());
    }
}
