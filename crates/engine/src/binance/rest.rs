use std::future::Future;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use common::{Candle, Error, MarketDataSource, Result};

use super::kline::parse_klines;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance caps one klines request at this many rows.
const MAX_PAGE: usize = 1000;

/// One klines response. `rows` counts every row the exchange sent, including
/// the malformed ones `candles` no longer holds.
#[derive(Debug, Default)]
struct KlinePage {
    rows: usize,
    candles: Vec<Candle>,
}

impl KlinePage {
    fn parse(payload: &Value) -> Self {
        Self {
            rows: payload.as_array().map_or(0, Vec::len),
            candles: parse_klines(payload),
        }
    }
}

/// Historical candles from the public Binance klines endpoint.
pub struct BinanceMarketData {
    base_url: String,
    http: Client,
}

impl BinanceMarketData {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn fetch_page(
        &self,
        pair: &str,
        interval: &str,
        limit: usize,
        end_time_ms: Option<i64>,
    ) -> Result<KlinePage> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={pair}&interval={interval}&limit={limit}",
            self.base_url
        );
        if let Some(end) = end_time_ms {
            url.push_str(&format!("&endTime={end}"));
        }

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::MarketData(format!("HTTP {status}: {body}")));
        }

        let payload: Value = serde_json::from_str(&body)?;
        Ok(KlinePage::parse(&payload))
    }
}

#[async_trait]
impl MarketDataSource for BinanceMarketData {
    fn name(&self) -> &str {
        "binance"
    }

    /// Pages backwards from now until `limit` candles are collected or the
    /// exchange runs out of history.
    async fn fetch_candles(&self, pair: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let candles = collect_pages(pair, limit, move |want, end_time_ms| {
            self.fetch_page(pair, interval, want, end_time_ms)
        })
        .await?;
        info!(pair = %pair, interval = %interval, count = candles.len(), "Historical candles fetched");
        Ok(candles)
    }
}

/// Request pages ending just before the oldest candle seen so far. A page
/// with fewer rows than requested is the start of history. Rows dropped as
/// malformed still count as delivered.
async fn collect_pages<F, Fut>(pair: &str, limit: usize, mut fetch: F) -> Result<Vec<Candle>>
where
    F: FnMut(usize, Option<i64>) -> Fut,
    Fut: Future<Output = Result<KlinePage>>,
{
    let mut candles: Vec<Candle> = Vec::with_capacity(limit);
    let mut end_time_ms = None;

    while candles.len() < limit {
        let want = (limit - candles.len()).min(MAX_PAGE);
        let page = fetch(want, end_time_ms).await?;
        if page.rows == 0 {
            break;
        }
        let Some(first) = page.candles.first() else {
            warn!(pair = %pair, rows = page.rows, "Kline page had no usable rows");
            break;
        };
        end_time_ms = Some(first.timestamp.timestamp_millis() - 1);
        debug!(pair = %pair, rows = page.rows, kept = page.candles.len(), "Fetched kline page");

        let last_page = page.rows < want;
        let mut merged = page.candles;
        merged.append(&mut candles);
        candles = merged;
        if last_page {
            break;
        }
    }

    if candles.is_empty() {
        return Err(Error::MarketData(format!("no klines returned for {pair}")));
    }
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use chrono::{TimeZone, Utc};

    use super::*;

    const MINUTE_MS: i64 = 60_000;

    fn candle(minute: i64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_millis_opt(minute * MINUTE_MS).unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 5.0,
        }
    }

    fn page(rows: usize, minutes: std::ops::Range<i64>) -> KlinePage {
        KlinePage {
            rows,
            candles: minutes.map(candle).collect(),
        }
    }

    async fn collect(
        limit: usize,
        pages: Vec<KlinePage>,
    ) -> (Result<Vec<Candle>>, Vec<(usize, Option<i64>)>) {
        let mut pages = VecDeque::from(pages);
        let mut calls = Vec::new();
        let out = collect_pages("BTCUSDT", limit, |want, end| {
            calls.push((want, end));
            std::future::ready(Ok(pages.pop_front().unwrap_or_default()))
        })
        .await;
        (out, calls)
    }

    #[tokio::test]
    async fn malformed_row_does_not_end_paging() {
        // first page: 5 rows sent, one dropped as malformed
        let (out, calls) = collect(5, vec![page(5, 11..15), page(1, 10..11)]).await;
        let candles = out.unwrap();

        assert_eq!(calls, vec![(5, None), (1, Some(11 * MINUTE_MS - 1))]);
        assert_eq!(candles.len(), 5);
        assert!(candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn short_page_is_the_start_of_history() {
        let (out, calls) = collect(10, vec![page(3, 0..3), page(10, 100..110)]).await;
        assert_eq!(out.unwrap().len(), 3);
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn empty_history_is_an_error() {
        let (out, _) = collect(10, vec![]).await;
        assert!(matches!(out, Err(Error::MarketData(_))));
    }

    #[test]
    fn page_counts_raw_rows() {
        let payload = serde_json::json!([
            [60_000, "1", "2", "0.5", "1.5", "10"],
            ["garbage"],
        ]);
        let page = KlinePage::parse(&payload);
        assert_eq!(page.rows, 2);
        assert_eq!(page.candles.len(), 1);
    }
}
