use async_trait::async_trait;
use chrono::Duration;

use crate::{Candle, Error, Result};

/// Abstraction over a source of historical candles.
///
/// `BinanceMarketData` implements this against the exchange kline endpoint.
/// `SyntheticMarketData` implements it with a seeded generator and is only
/// used as a labeled fallback.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short identifier shown in logs.
    fn name(&self) -> &str;

    /// Fetch up to `limit` most recent candles for `pair` at `interval`
    /// (e.g. "1m", "5m"), ordered oldest first.
    async fn fetch_candles(&self, pair: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;
}

/// Parse a kline interval such as `"1m"`, `"15m"`, `"4h"`, `"1d"`.
pub fn parse_interval(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::InvalidInput(format!("interval '{raw}' has no unit")))?;
    let (num, unit) = raw.split_at(split);
    let n: i64 = num
        .parse()
        .map_err(|_| Error::InvalidInput(format!("interval '{raw}' has no count")))?;
    if n <= 0 {
        return Err(Error::InvalidInput(format!("interval '{raw}' must be positive")));
    }
    match unit {
        "s" => Ok(Duration::seconds(n)),
        "m" => Ok(Duration::minutes(n)),
        "h" => Ok(Duration::hours(n)),
        "d" => Ok(Duration::days(n)),
        "w" => Ok(Duration::weeks(n)),
        _ => Err(Error::InvalidInput(format!("unknown interval unit in '{raw}'"))),
    }
}
