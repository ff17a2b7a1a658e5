//! # api::protocol
//!
//! Wire envelopes for the Deriv JSON protocol and the normalization of
//! server candle shapes into [`Candle`].
//!
//! Outbound envelopes get their `req_id` correlation field attached by the
//! client's request path, not here.  Numeric fields arrive as numbers *or*
//! strings depending on the endpoint, so all price parsing goes through
//! [`flex_f64`].

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::Candle;

// ─── Outbound Requests ────────────────────────────────────────────────────────

/// `ticks_history` — historical fetch, or live stream when `subscribe` is set.
#[derive(Debug, Serialize)]
pub struct TicksHistoryRequest {
    pub ticks_history: String,
    pub adjust_start_time: u8,
    pub count: u32,
    /// `"latest"` = up to now.
    pub end: String,
    /// Bucket duration in seconds.
    pub granularity: u32,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<u8>,
}

impl TicksHistoryRequest {
    /// Historical range fetch: `count` closed bars up to now.
    pub fn history(symbol: &str, granularity: u32, count: u32) -> Self {
        Self {
            ticks_history: symbol.to_string(),
            adjust_start_time: 1,
            count,
            end: "latest".to_string(),
            granularity,
            style: "candles".to_string(),
            subscribe: None,
        }
    }

    /// Live stream: one seed bar plus the subscribe flag.
    pub fn subscription(symbol: &str, granularity: u32) -> Self {
        Self {
            ticks_history: symbol.to_string(),
            adjust_start_time: 1,
            count: 1,
            end: "latest".to_string(),
            granularity,
            style: "candles".to_string(),
            subscribe: Some(1),
        }
    }
}

/// `active_symbols` — tradable instrument catalog (brief style).
#[derive(Debug, Serialize)]
pub struct ActiveSymbolsRequest {
    pub active_symbols: String,
    pub product_type: String,
}

impl Default for ActiveSymbolsRequest {
    fn default() -> Self {
        Self {
            active_symbols: "brief".to_string(),
            product_type: "basic".to_string(),
        }
    }
}

/// `forget` — tear down one server-side subscription.
#[derive(Debug, Serialize)]
pub struct ForgetRequest {
    pub forget: String,
}

// ─── Flexible Scalar Parsing ──────────────────────────────────────────────────

/// Number-or-string float.
pub fn flex_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Number-or-string integer (epochs occasionally arrive quoted).
pub fn flex_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ─── Inbound Normalization ────────────────────────────────────────────────────

/// Normalizes a `ticks_history` response into candles.
///
/// Two shapes exist: the usual `candles` array, and the alternate
/// `history { prices, times }` pair which is flattened into degenerate
/// o=h=l=c bars.
pub fn parse_candles_response(response: &Value) -> Result<Vec<Candle>, ApiError> {
    if let Some(list) = response.get("candles").and_then(Value::as_array) {
        return list.iter().map(parse_history_candle).collect();
    }

    if let Some(history) = response.get("history") {
        let prices = history
            .get("prices")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Protocol("history shape missing prices".to_string()))?;
        let times = history
            .get("times")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Protocol("history shape missing times".to_string()))?;

        return prices
            .iter()
            .zip(times)
            .map(|(price, time)| {
                let price = flex_f64(price)
                    .ok_or_else(|| ApiError::Protocol("unparseable history price".to_string()))?;
                let time = flex_i64(time)
                    .ok_or_else(|| ApiError::Protocol("unparseable history time".to_string()))?;
                Ok(Candle::flat(time, price))
            })
            .collect();
    }

    Err(ApiError::Protocol("no candles in response".to_string()))
}

fn parse_history_candle(value: &Value) -> Result<Candle, ApiError> {
    let field = |name: &str| {
        flex_f64(&value[name])
            .ok_or_else(|| ApiError::Protocol(format!("candle missing field `{name}`")))
    };
    Ok(Candle {
        time: flex_i64(&value["epoch"])
            .ok_or_else(|| ApiError::Protocol("candle missing field `epoch`".to_string()))?,
        open: field("open")?,
        high: field("high")?,
        low: field("low")?,
        close: field("close")?,
        volume: flex_f64(&value["volume"]).unwrap_or(0.0),
    })
}

/// Parses the `ohlc` object of a streaming push into a candle.
/// `open_time` is the bucket start — the update's own `epoch` moves within
/// the bucket while the bar is still open.
pub fn parse_ohlc_candle(ohlc: &Value) -> Option<Candle> {
    Some(Candle {
        time: flex_i64(&ohlc["open_time"])?,
        open: flex_f64(&ohlc["open"])?,
        high: flex_f64(&ohlc["high"])?,
        low: flex_f64(&ohlc["low"])?,
        close: flex_f64(&ohlc["close"])?,
        volume: flex_f64(&ohlc["volume"]).unwrap_or(0.0),
    })
}

/// Server-assigned subscription id of a subscribe response.
pub fn subscription_id(response: &Value) -> Option<&str> {
    response.get("subscription")?.get("id")?.as_str()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_request_has_no_subscribe_flag() {
        let value = serde_json::to_value(TicksHistoryRequest::history("R_100", 1800, 500)).unwrap();
        assert_eq!(value["ticks_history"], "R_100");
        assert_eq!(value["count"], 500);
        assert_eq!(value["end"], "latest");
        assert!(value.get("subscribe").is_none());
    }

    #[test]
    fn test_subscription_request_is_single_bar_with_flag() {
        let value = serde_json::to_value(TicksHistoryRequest::subscription("R_100", 60)).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["subscribe"], 1);
        assert_eq!(value["granularity"], 60);
    }

    #[test]
    fn test_parse_candles_array_with_string_prices() {
        let response = json!({
            "candles": [
                { "epoch": 1000, "open": "1.1", "high": "1.3", "low": "1.0", "close": "1.2" },
                { "epoch": 1060, "open": 1.2, "high": 1.4, "low": 1.1, "close": 1.3 },
            ]
        });
        let candles = parse_candles_response(&response).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1000);
        assert_eq!(candles[0].close, 1.2);
        assert_eq!(candles[1].high, 1.4);
        assert_eq!(candles[0].volume, 0.0);
    }

    #[test]
    fn test_parse_alternate_history_shape() {
        let response = json!({
            "history": { "prices": [10.5, "11.5"], "times": [100, 160] }
        });
        let candles = parse_candles_response(&response).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0], Candle::flat(100, 10.5));
        assert_eq!(candles[1], Candle::flat(160, 11.5));
    }

    #[test]
    fn test_parse_rejects_shapeless_response() {
        assert!(parse_candles_response(&json!({ "msg_type": "ping" })).is_err());
    }

    #[test]
    fn test_parse_ohlc_push() {
        let ohlc = json!({
            "id": "abc-123",
            "open_time": 1200, "epoch": 1234,
            "open": "99.1", "high": "99.9", "low": "98.7", "close": "99.5",
            "granularity": 60, "symbol": "R_100"
        });
        let candle = parse_ohlc_candle(&ohlc).unwrap();
        assert_eq!(candle.time, 1200);
        assert_eq!(candle.close, 99.5);
    }

    #[test]
    fn test_subscription_id_extraction() {
        let response = json!({ "subscription": { "id": "sub-9" }, "req_id": 4 });
        assert_eq!(subscription_id(&response), Some("sub-9"));
        assert_eq!(subscription_id(&json!({})), None);
    }
}
