//! KuCoin Futures wire types and their conversion to domain types

use chrono::{TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::{ExchangeOrder, OrderSide, OrderStatus, Position, PositionSide};
use crate::ports::exchange::ExchangeError;
use crate::ports::market_data::Ohlcv;

/// Success code of the response envelope
pub const SUCCESS_CODE: &str = "200000";
/// Venue-level rate limit code (may arrive with HTTP 200 or 429)
pub const RATE_LIMIT_CODE: &str = "429000";

/// Accepts numbers sent either as JSON numbers or strings
fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) => Ok(s.parse::<f64>().ok()),
        _ => Ok(None),
    }
}

/// `{"code": "200000", "data": ..., "msg": ...}`
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub data: Option<T>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<T, ExchangeError> {
        if self.code == RATE_LIMIT_CODE {
            return Err(ExchangeError::RateLimited(self.msg.unwrap_or_default()));
        }
        if self.code != SUCCESS_CODE {
            let message = self.msg.unwrap_or_default();
            return Err(match self.code.as_str() {
                "400001" | "400002" | "400003" | "400004" | "400005" | "400006" | "400007" | "411100" => {
                    ExchangeError::Authentication(format!("{} ({})", message, self.code))
                }
                _ => ExchangeError::api(self.code, message),
            });
        }
        self.data
            .ok_or_else(|| ExchangeError::Parse("response has no data".to_string()))
    }
}

/// Response for endpoints that return no useful payload
#[derive(Debug, Deserialize)]
pub struct Ack {
    pub code: String,
    #[serde(default)]
    pub msg: Option<String>,
}

impl Ack {
    pub fn into_result(self) -> Result<(), ExchangeError> {
        ApiResponse::<()> {
            code: self.code,
            data: Some(()),
            msg: self.msg,
        }
        .into_result()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default)]
    pub total_page: Option<u32>,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// True when `page_number` (1-based) is the final page or came back empty
    pub fn is_last(&self, page_number: u32) -> bool {
        self.items.is_empty() || self.total_page.map_or(true, |total| page_number >= total)
    }
}

/// Contract metadata from `/api/v1/contracts/{symbol}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    pub symbol: String,
    /// Base-asset quantity per contract
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub multiplier: Option<f64>,
    /// Minimum order size in contracts
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub lot_size: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub tick_size: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub side: String,
    #[serde(default)]
    pub reduce_only: Option<bool>,
    #[serde(default)]
    pub close_order: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub stop_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub size: Option<f64>,
    /// "down" / "up" for trigger orders, empty for plain orders
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub stop_triggered: Option<bool>,
    #[serde(default)]
    pub cancel_exist: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl OrderItem {
    pub fn is_trigger_order(&self) -> bool {
        self.stop.as_deref().is_some_and(|s| !s.is_empty())
    }

    fn status(&self) -> Option<OrderStatus> {
        if self.stop_triggered == Some(true) {
            Some(OrderStatus::Triggered)
        } else if self.cancel_exist == Some(true) {
            Some(OrderStatus::Cancelled)
        } else if self.is_active == Some(true) {
            Some(OrderStatus::Open)
        } else {
            None
        }
    }

    pub fn into_order(self) -> Result<ExchangeOrder, ExchangeError> {
        let side = parse_side(&self.side)?;
        let status = self.status();
        let reduce_only = match (self.reduce_only, self.close_order) {
            (None, None) => None,
            (r, c) => Some(r.unwrap_or(false) || c.unwrap_or(false)),
        };
        Ok(ExchangeOrder {
            id: self.id,
            side,
            reduce_only,
            trigger_price: self.stop_price,
            amount: self.size,
            status,
        })
    }
}

pub fn parse_side(side: &str) -> Result<OrderSide, ExchangeError> {
    match side.to_ascii_lowercase().as_str() {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(ExchangeError::Parse(format!("unknown order side '{}'", other))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionItem {
    pub symbol: String,
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub current_qty: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub avg_entry_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub mark_price: Option<f64>,
    /// Milliseconds since epoch
    #[serde(default)]
    pub opening_timestamp: Option<i64>,
}

impl PositionItem {
    /// Open, non-empty position in unified form; `None` when flat
    pub fn into_position(self, unified_symbol: &str) -> Option<Position> {
        let qty = self.current_qty.unwrap_or(0.0);
        if self.is_open == Some(false) || qty == 0.0 {
            return None;
        }
        let side = if qty > 0.0 { PositionSide::Long } else { PositionSide::Short };
        let entry_price = self.avg_entry_price.unwrap_or(0.0);
        let mut position = Position::new(unified_symbol, side, entry_price, qty)
            .with_mark_price(self.mark_price.unwrap_or(entry_price));
        if let Some(opened_at) = self.opening_timestamp.and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
            position = position.with_opened_at(opened_at);
        }
        Some(position)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOverview {
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub available_balance: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub account_equity: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: String,
}

/// Body of `POST /api/v1/orders`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub client_oid: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_order: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_mode: Option<&'static str>,
}

/// Kline rows: `[time_ms, open, high, low, close, volume]`
pub fn parse_klines(rows: Vec<Vec<serde_json::Value>>) -> Result<Vec<Ohlcv>, ExchangeError> {
    let number = |value: &serde_json::Value| -> Result<f64, ExchangeError> {
        match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| ExchangeError::Parse(format!("invalid kline value {}", value)))
    };

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() < 6 {
            return Err(ExchangeError::Parse(format!("kline row has {} fields", row.len())));
        }
        let ms = number(&row[0])? as i64;
        let timestamp = Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| ExchangeError::Parse(format!("invalid kline time {}", ms)))?;
        candles.push(Ohlcv {
            timestamp,
            open: number(&row[1])?,
            high: number(&row[2])?,
            low: number(&row[3])?,
            close: number(&row[4])?,
            volume: number(&row[5])?,
        });
    }
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

/// `BTC/USDT:USDT` -> `XBTUSDTM`, `BTC/USD:BTC` -> `XBTUSDM`; venue ids pass through
pub fn to_venue_symbol(symbol: &str) -> String {
    let Some((pair, _settle)) = symbol.split_once(':') else {
        return symbol.to_string();
    };
    let Some((base, quote)) = pair.split_once('/') else {
        return symbol.to_string();
    };
    let base = if base == "BTC" { "XBT" } else { base };
    format!("{}{}M", base, quote)
}

/// Round `price` to the contract tick and render it without float noise
pub fn format_price(price: f64, tick_size: Option<f64>) -> Result<String, ExchangeError> {
    let value = Decimal::from_f64(price)
        .ok_or_else(|| ExchangeError::InvalidRequest(format!("price {} is not representable", price)))?;

    let rounded = match tick_size.and_then(Decimal::from_f64).filter(|t| !t.is_zero()) {
        Some(tick) => {
            (value / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * tick
        }
        None => value.round_dp(8),
    };

    if rounded.to_f64().is_some_and(|p| p <= 0.0) {
        return Err(ExchangeError::InvalidRequest(format!("price {} rounds to zero", price)));
    }
    Ok(rounded.normalize().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success_and_errors() {
        let ok: ApiResponse<ContractInfo> = serde_json::from_str(
            r#"{"code":"200000","data":{"symbol":"XBTUSDTM","multiplier":0.001,"lotSize":1,"tickSize":0.1}}"#,
        )
        .unwrap();
        let contract = ok.into_result().unwrap();
        assert_eq!(contract.multiplier, Some(0.001));
        assert_eq!(contract.lot_size, Some(1.0));

        let limited: ApiResponse<ContractInfo> =
            serde_json::from_str(r#"{"code":"429000","msg":"Too Many Requests"}"#).unwrap();
        assert!(matches!(limited.into_result(), Err(ExchangeError::RateLimited(_))));

        let auth: ApiResponse<ContractInfo> =
            serde_json::from_str(r#"{"code":"400003","msg":"KC-API-KEY not exists"}"#).unwrap();
        assert!(matches!(auth.into_result(), Err(ExchangeError::Authentication(_))));

        let other: Ack = serde_json::from_str(r#"{"code":"300000","msg":"Order does not exist"}"#).unwrap();
        assert_eq!(
            other.into_result(),
            Err(ExchangeError::api("300000", "Order does not exist"))
        );
    }

    #[test]
    fn test_page_bounds() {
        let first: Page<OrderItem> =
            serde_json::from_str(r#"{"currentPage":1,"totalPage":3,"items":[{"id":"a","side":"buy"}]}"#).unwrap();
        assert!(!first.is_last(1));
        assert!(first.is_last(3));

        let single: Page<OrderItem> = serde_json::from_str(r#"{"items":[{"id":"a","side":"buy"}]}"#).unwrap();
        assert!(single.is_last(1));

        let empty: Page<OrderItem> = serde_json::from_str(r#"{"currentPage":2,"totalPage":9,"items":[]}"#).unwrap();
        assert!(empty.is_last(2));
    }

    #[test]
    fn test_stop_order_parsing() {
        let page: Page<OrderItem> = serde_json::from_str(
            r#"{"currentPage":1,"items":[
                {"id":"5cdfc138b21023a909e5ad55","side":"buy","stop":"down","stopPrice":"8010","size":5,"reduceOnly":false,"isActive":true},
                {"id":"5cdfc138b21023a909e5ad56","side":"sell","stop":"down","stopPrice":"7600","size":5,"reduceOnly":true,"stopTriggered":true,"isActive":false},
                {"id":"5cdfc138b21023a909e5ad57","side":"sell","stop":"up","stopPrice":"9000","size":5,"cancelExist":true,"isActive":false}
            ]}"#,
        )
        .unwrap();

        let orders: Vec<ExchangeOrder> = page
            .items
            .into_iter()
            .map(|o| o.into_order().unwrap())
            .collect();
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert!(orders[0].is_pending_entry());
        assert_eq!(orders[0].trigger_price, Some(8010.0));
        assert_eq!(orders[0].status, Some(OrderStatus::Open));
        assert_eq!(orders[1].status, Some(OrderStatus::Triggered));
        assert!(orders[1].is_reduce_only());
        assert!(orders[2].was_cancelled());
        assert_eq!(orders[2].reduce_only, None);
    }

    #[test]
    fn test_plain_order_is_not_trigger() {
        let item: OrderItem = serde_json::from_str(r#"{"id":"1","side":"buy","stop":""}"#).unwrap();
        assert!(!item.is_trigger_order());
        let item: OrderItem = serde_json::from_str(r#"{"id":"2","side":"sell","stop":"up"}"#).unwrap();
        assert!(item.is_trigger_order());
    }

    #[test]
    fn test_position_parsing() {
        let item: PositionItem = serde_json::from_str(
            r#"{"symbol":"XBTUSDTM","isOpen":true,"currentQty":-12,"avgEntryPrice":"42000.5","markPrice":41900,"openingTimestamp":1700000000000}"#,
        )
        .unwrap();
        let position = item.into_position("BTC/USDT:USDT").unwrap();
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.contracts, 12.0);
        assert_eq!(position.entry_price, 42000.5);
        assert_eq!(position.opened_at.unwrap().timestamp_millis(), 1_700_000_000_000);

        let flat: PositionItem =
            serde_json::from_str(r#"{"symbol":"XBTUSDTM","isOpen":false,"currentQty":0}"#).unwrap();
        assert!(flat.into_position("BTC/USDT:USDT").is_none());
    }

    #[test]
    fn test_klines_sorted_oldest_first() {
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(
            r#"[[1700003600000,101,103,100,102,7],[1700000000000,100,102,99,101,5]]"#,
        )
        .unwrap();
        let candles = parse_klines(rows).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].close, 101.0);

        let short: Vec<Vec<serde_json::Value>> = serde_json::from_str("[[1,2,3]]").unwrap();
        assert!(parse_klines(short).is_err());
    }

    #[test]
    fn test_venue_symbol() {
        assert_eq!(to_venue_symbol("BTC/USDT:USDT"), "XBTUSDTM");
        assert_eq!(to_venue_symbol("ETH/USDT:USDT"), "ETHUSDTM");
        assert_eq!(to_venue_symbol("BTC/USD:BTC"), "XBTUSDM");
        assert_eq!(to_venue_symbol("SOLUSDTM"), "SOLUSDTM");
    }

    #[test]
    fn test_format_price_to_tick() {
        assert_eq!(format_price(42123.456, Some(0.1)).unwrap(), "42123.5");
        assert_eq!(format_price(0.123456789, Some(0.0001)).unwrap(), "0.1235");
        assert_eq!(format_price(90.0 * 1.005, Some(0.01)).unwrap(), "90.45");
        assert_eq!(format_price(100.0, Some(1.0)).unwrap(), "100");
        assert_eq!(format_price(1.5, None).unwrap(), "1.5");
        assert!(format_price(0.00001, Some(0.1)).is_err());
    }

    #[test]
    fn test_order_request_serialization() {
        let request = OrderRequest {
            client_oid: "abc".to_string(),
            symbol: "XBTUSDTM".to_string(),
            order_type: "market",
            side: Some("sell"),
            price: None,
            size: Some(3),
            leverage: Some("2".to_string()),
            stop: Some("down"),
            stop_price_type: Some("MP"),
            stop_price: Some("25000".to_string()),
            reduce_only: Some(true),
            close_order: None,
            margin_mode: Some("ISOLATED"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "market");
        assert_eq!(json["clientOid"], "abc");
        assert_eq!(json["stopPriceType"], "MP");
        assert_eq!(json["reduceOnly"], true);
        assert!(json.get("price").is_none());
        assert!(json.get("closeOrder").is_none());
    }
}
