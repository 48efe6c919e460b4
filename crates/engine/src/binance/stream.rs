use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use common::{CandleEvent, Error, Result};

use super::kline::parse_kline_event;

pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Binance kline WebSocket stream for a single pair.
///
/// Publishes every kline update as a [`CandleEvent`] on a broadcast channel.
/// Reconnects automatically with exponential backoff until cancelled.
pub struct BinanceStream {
    pair: String,
    interval: String,
    ws_url: String,
    market_tx: broadcast::Sender<CandleEvent>,
}

impl BinanceStream {
    pub fn new(
        pair: impl Into<String>,
        interval: impl Into<String>,
        market_tx: broadcast::Sender<CandleEvent>,
    ) -> Self {
        Self {
            pair: pair.into(),
            interval: interval.into(),
            ws_url: DEFAULT_WS_URL.to_string(),
            market_tx,
        }
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    /// Run the stream loop until `cancel` fires, reconnecting on failure.
    /// Call this inside a `tokio::spawn`.
    pub async fn run(self, cancel: CancellationToken) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            info!(pair = %self.pair, interval = %self.interval, "Connecting to Binance WebSocket stream");
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.connect_once() => r,
            };
            let delay = match outcome {
                Ok(()) => {
                    info!(pair = %self.pair, "WebSocket stream closed cleanly");
                    backoff = Duration::from_secs(1);
                    backoff
                }
                Err(e) => {
                    warn!(pair = %self.pair, error = %e, backoff = ?backoff, "WebSocket error, reconnecting");
                    let d = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    d
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(pair = %self.pair, "WebSocket stream stopped");
    }

    fn stream_url(&self) -> Result<Url> {
        let raw = format!(
            "{}/{}@kline_{}",
            self.ws_url.trim_end_matches('/'),
            self.pair.to_lowercase(),
            self.interval
        );
        Url::parse(&raw).map_err(|e| Error::WebSocket(e.to_string()))
    }

    async fn connect_once(&self) -> Result<()> {
        let (ws_stream, _) = connect_async(self.stream_url()?)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;

            if let Message::Text(text) = msg {
                match parse_kline_event(&self.pair, &text) {
                    Ok(Some(event)) => {
                        // no receivers is fine
                        let _ = self.market_tx.send(event);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(pair = %self.pair, error = %e, "Failed to parse kline event");
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_uses_lowercase_pair_and_interval() {
        let (tx, _) = broadcast::channel(1);
        let stream = BinanceStream::new("BTCUSDT", "5m", tx).with_ws_url("wss://example.test/ws/");
        assert_eq!(
            stream.stream_url().unwrap().as_str(),
            "wss://example.test/ws/btcusdt@kline_5m"
        );
    }

    #[tokio::test]
    async fn cancelled_stream_returns() {
        let (tx, _) = broadcast::channel(1);
        let stream = BinanceStream::new("BTCUSDT", "1m", tx).with_ws_url("ws://127.0.0.1:9/ws");
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), stream.run(cancel))
            .await
            .unwrap();
    }
}
