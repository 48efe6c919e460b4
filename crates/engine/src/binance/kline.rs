use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use common::{Candle, CandleEvent, Result};

/// Normalize a kline payload into ascending, de-duplicated, valid candles.
///
/// Rows may be Binance positional arrays
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
/// or objects `{time, open, high, low, close, volume}`. Numbers may be
/// JSON numbers or numeric strings. Malformed rows are dropped.
pub fn parse_klines(payload: &Value) -> Vec<Candle> {
    let Some(rows) = payload.as_array() else {
        warn!("Kline payload is not an array");
        return Vec::new();
    };

    let mut candles: Vec<Candle> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let candle = match row {
                Value::Array(fields) => from_array(fields),
                Value::Object(_) => from_object(row),
                _ => None,
            };
            match candle {
                Some(c) if c.is_valid() => Some(c),
                _ => {
                    debug!(row = i, "Dropping malformed kline row");
                    None
                }
            }
        })
        .collect();

    candles.sort_by_key(|c| c.timestamp);
    let before = candles.len();
    candles.dedup_by_key(|c| c.timestamp);
    if candles.len() != before {
        debug!(dropped = before - candles.len(), "Dropped duplicate kline timestamps");
    }
    candles
}

fn from_array(fields: &[Value]) -> Option<Candle> {
    if fields.len() < 6 {
        return None;
    }
    Some(Candle {
        timestamp: timestamp(&fields[0])?,
        open: number(&fields[1])?,
        high: number(&fields[2])?,
        low: number(&fields[3])?,
        close: number(&fields[4])?,
        volume: number(&fields[5])?,
    })
}

fn from_object(row: &Value) -> Option<Candle> {
    let time = row.get("time").or_else(|| row.get("timestamp"))?;
    Some(Candle {
        timestamp: timestamp(time)?,
        open: number(row.get("open")?)?,
        high: number(row.get("high")?)?,
        low: number(row.get("low")?)?,
        close: number(row.get("close")?)?,
        volume: number(row.get("volume")?)?,
    })
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Epoch milliseconds, epoch seconds (values below 1e11) or RFC 3339.
fn timestamp(v: &Value) -> Option<DateTime<Utc>> {
    if let Value::String(s) = v {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let raw = number(v)?;
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let millis = if raw < 1e11 { raw * 1000.0 } else { raw };
    Utc.timestamp_millis_opt(millis as i64).single()
}

// ─── WebSocket kline events ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct KlineWrapper {
    k: KlineData,
}

#[derive(Deserialize)]
struct KlineData {
    #[serde(rename = "t")]
    open_time_ms: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// Parse one stream message. `Ok(None)` for non-kline messages and for
/// klines whose fields do not form a valid candle.
pub fn parse_kline_event(pair: &str, text: &str) -> Result<Option<CandleEvent>> {
    let wrapper: Value = serde_json::from_str(text)?;
    if wrapper.get("e").and_then(|v| v.as_str()) != Some("kline") {
        return Ok(None);
    }

    let k = serde_json::from_value::<KlineWrapper>(wrapper)?.k;
    let Some(timestamp) = Utc.timestamp_millis_opt(k.open_time_ms).single() else {
        return Ok(None);
    };
    let parse = |s: &str| s.parse::<f64>().ok();
    let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
        parse(&k.open),
        parse(&k.high),
        parse(&k.low),
        parse(&k.close),
        parse(&k.volume),
    ) else {
        return Ok(None);
    };

    let candle = Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    };
    if !candle.is_valid() {
        return Ok(None);
    }
    Ok(Some(CandleEvent {
        pair: pair.to_string(),
        candle,
        is_closed: k.is_closed,
    }))
}
