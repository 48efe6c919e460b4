use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{Candle, DataOrigin, Error, MarketDataSource, Result};

use crate::backtest::{simulate, BacktestResult, SimulationConfig};
use crate::dispatcher::EngineEvent;
use crate::store::BacktestStore;

/// A finished run tagged with where its candles came from. Reports built
/// on synthetic data must never be mistaken for exchange results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub result: BacktestResult,
    pub origin: DataOrigin,
}

impl BacktestReport {
    pub fn is_synthetic(&self) -> bool {
        self.origin == DataOrigin::Synthetic
    }
}

#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub id: Uuid,
    /// Whether the report was written to the store.
    pub stored: bool,
    pub report: BacktestReport,
}

/// Fetches candles, runs [`simulate`] off the async runtime, then stores
/// and announces the result.
pub struct BacktestRunner {
    source: Arc<dyn MarketDataSource>,
    fallback: Option<Arc<dyn MarketDataSource>>,
    store: Option<Arc<dyn BacktestStore>>,
    events: Option<mpsc::Sender<EngineEvent>>,
    limit: usize,
}

impl BacktestRunner {
    pub fn new(source: Arc<dyn MarketDataSource>, limit: usize) -> Self {
        Self {
            source,
            fallback: None,
            store: None,
            events: None,
            limit,
        }
    }

    /// Source used when the primary fetch fails. Results from it are
    /// tagged [`DataOrigin::Synthetic`].
    pub fn with_fallback(mut self, fallback: Arc<dyn MarketDataSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn BacktestStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    async fn candles(&self, pair: &str, interval: &str) -> Result<(Vec<Candle>, DataOrigin)> {
        let primary = self.source.fetch_candles(pair, interval, self.limit).await;
        let failure = match primary {
            Ok(candles) if !candles.is_empty() => return Ok((candles, DataOrigin::Exchange)),
            Ok(_) => Error::MarketData(format!("{} returned no candles", self.source.name())),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(failure);
        };
        warn!(
            pair = %pair,
            source = self.source.name(),
            fallback = fallback.name(),
            error = %failure,
            "Market data fetch failed, falling back to SYNTHETIC data"
        );
        let candles = fallback.fetch_candles(pair, interval, self.limit).await?;
        Ok((candles, DataOrigin::Synthetic))
    }

    /// Run one backtest end to end.
    pub async fn run(&self, config: SimulationConfig, cancel: &CancellationToken) -> Result<CompletedRun> {
        let (candles, origin) = self.candles(&config.pair, &config.interval).await?;
        info!(pair = %config.pair, candles = candles.len(), origin = ?origin, "Running backtest");

        let token = cancel.clone();
        let result = tokio::task::spawn_blocking(move || simulate(&candles, &config, Some(&token)))
            .await
            .map_err(|e| Error::Other(format!("backtest task failed: {e}")))??;

        let report = BacktestReport { result, origin };
        let (id, stored) = match &self.store {
            Some(store) => match store.save(&report).await {
                Ok(id) => (id, true),
                Err(e) => {
                    error!(pair = %report.result.params.pair, error = %e, "Failed to store backtest");
                    (Uuid::new_v4(), false)
                }
            },
            None => (Uuid::new_v4(), false),
        };

        if let Some(events) = &self.events {
            let event = EngineEvent::BacktestCompleted {
                id,
                pair: report.result.params.pair.clone(),
                origin,
                metrics: report.result.metrics.clone(),
            };
            if events.send(event).await.is_err() {
                warn!("Event channel closed, dropping backtest event");
            }
        }

        Ok(CompletedRun { id, stored, report })
    }

    /// Run several pairs concurrently. Results come back in input order.
    pub async fn run_all(
        &self,
        configs: Vec<SimulationConfig>,
        cancel: &CancellationToken,
    ) -> Vec<Result<CompletedRun>> {
        join_all(configs.into_iter().map(|c| self.run(c, cancel))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct Fixed {
        name: &'static str,
        candles: Result<Vec<Candle>>,
    }

    #[async_trait]
    impl MarketDataSource for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_candles(&self, _pair: &str, _interval: &str, _limit: usize) -> Result<Vec<Candle>> {
            match &self.candles {
                Ok(c) => Ok(c.clone()),
                Err(e) => Err(Error::MarketData(e.to_string())),
            }
        }
    }

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 3.0;
                Candle {
                    timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 50.0,
                }
            })
            .collect()
    }

    fn config(pair: &str) -> SimulationConfig {
        SimulationConfig {
            pair: pair.into(),
            interval: "1m".into(),
            ..SimulationConfig::default()
        }
    }

    fn down() -> Arc<dyn MarketDataSource> {
        Arc::new(Fixed {
            name: "down",
            candles: Err(Error::MarketData("unreachable".into())),
        })
    }

    #[tokio::test]
    async fn exchange_data_is_tagged_exchange() {
        let source = Arc::new(Fixed { name: "ok", candles: Ok(candles(120)) });
        let runner = BacktestRunner::new(source, 120);
        let run = runner.run(config("BTCUSDT"), &CancellationToken::new()).await.unwrap();
        assert_eq!(run.report.origin, DataOrigin::Exchange);
        assert!(!run.stored);
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_tagged_synthetic() {
        let fallback = Arc::new(Fixed { name: "synthetic", candles: Ok(candles(120)) });
        let (tx, mut rx) = mpsc::channel(4);
        let runner = BacktestRunner::new(down(), 120)
            .with_fallback(fallback)
            .with_events(tx);

        let run = runner.run(config("BTCUSDT"), &CancellationToken::new()).await.unwrap();
        assert!(run.report.is_synthetic());
        match rx.recv().await.unwrap() {
            EngineEvent::BacktestCompleted { id, origin, .. } => {
                assert_eq!(id, run.id);
                assert_eq!(origin, DataOrigin::Synthetic);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_failure_without_fallback_is_an_error() {
        let runner = BacktestRunner::new(down(), 120);
        let err = runner.run(config("BTCUSDT"), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::MarketData(_)));
    }

    #[tokio::test]
    async fn cancellation_reaches_the_simulation() {
        let source = Arc::new(Fixed { name: "ok", candles: Ok(candles(120)) });
        let runner = BacktestRunner::new(source, 120);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner.run(config("BTCUSDT"), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn run_all_keeps_input_order() {
        let source = Arc::new(Fixed { name: "ok", candles: Ok(candles(120)) });
        let runner = BacktestRunner::new(source, 120);
        let runs = runner
            .run_all(vec![config("BTCUSDT"), config("ETHUSDT")], &CancellationToken::new())
            .await;
        let pairs: Vec<String> = runs
            .into_iter()
            .map(|r| r.unwrap().report.result.params.pair)
            .collect();
        assert_eq!(pairs, vec!["BTCUSDT", "ETHUSDT"]);
    }
}
