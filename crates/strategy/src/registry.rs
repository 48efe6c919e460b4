use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use common::{Candle, CandleEvent, CandleWindow};

use crate::analyzer::{Analysis, IndicatorSet, SignalAnalyzer};

/// Result of analysing one closed candle of one pair.
#[derive(Debug, Clone)]
pub struct PairAnalysis {
    pub pair: String,
    pub candle: Candle,
    pub analysis: Analysis,
}

/// Rolling state for a single pair. Only closed candles enter the window.
pub struct PairTracker {
    pair: String,
    window: CandleWindow,
    analyzer: Arc<SignalAnalyzer>,
}

impl PairTracker {
    pub fn new(pair: impl Into<String>, capacity: usize, analyzer: Arc<SignalAnalyzer>) -> Self {
        Self {
            pair: pair.into(),
            window: CandleWindow::new(capacity),
            analyzer,
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn window(&self) -> &CandleWindow {
        &self.window
    }

    /// Preload closed history without emitting analyses. Returns how many
    /// candles were accepted.
    pub fn seed(&mut self, history: &[Candle]) -> usize {
        let mut accepted = 0;
        for candle in history {
            if candle.is_valid() && self.window.push(*candle) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Feed one stream event. Returns an analysis of the newest candle once
    /// a closed candle has been accepted into the window.
    pub fn on_event(&mut self, event: &CandleEvent) -> Option<PairAnalysis> {
        if !event.is_closed {
            return None;
        }
        if !event.candle.is_valid() {
            warn!(pair = %self.pair, ts = %event.candle.timestamp, "Dropping invalid candle");
            return None;
        }
        if !self.window.push(event.candle) {
            debug!(pair = %self.pair, ts = %event.candle.timestamp, "Stale or duplicate candle ignored");
            return None;
        }

        let candles = self.window.to_vec();
        let set = IndicatorSet::compute(&candles, self.analyzer.indicator_config());
        let analysis = self.analyzer.analyze(&candles, &set, candles.len() - 1)?;
        Some(PairAnalysis {
            pair: self.pair.clone(),
            candle: event.candle,
            analysis,
        })
    }

    /// Per-pair loop: events for this pair are handled strictly one at a time.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CandleEvent>, tx: mpsc::Sender<PairAnalysis>) {
        debug!(pair = %self.pair, "Pair tracker running");
        while let Some(event) = rx.recv().await {
            if let Some(out) = self.on_event(&event) {
                if tx.send(out).await.is_err() {
                    warn!(pair = %self.pair, "Analysis channel closed, stopping pair tracker");
                    return;
                }
            }
        }
        debug!(pair = %self.pair, "Pair tracker input closed");
    }
}

/// Routes candle events to one [`PairTracker`] task per pair.
///
/// Different pairs are analysed concurrently; events of the same pair are
/// serialized through that pair's queue.
pub struct StrategyRegistry {
    analyzer: Arc<SignalAnalyzer>,
    capacity: usize,
    queue_depth: usize,
    routes: HashMap<String, mpsc::Sender<CandleEvent>>,
    history: HashMap<String, Vec<Candle>>,
}

impl StrategyRegistry {
    const DEFAULT_QUEUE_DEPTH: usize = 64;

    pub fn new(analyzer: Arc<SignalAnalyzer>, capacity: usize) -> Self {
        Self {
            analyzer,
            capacity,
            queue_depth: Self::DEFAULT_QUEUE_DEPTH,
            routes: HashMap::new(),
            history: HashMap::new(),
        }
    }

    /// Closed candles to seed `pair`'s tracker with when it starts.
    pub fn with_history(mut self, pair: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.history.insert(pair.into(), candles);
        self
    }

    pub fn tracked_pairs(&self) -> usize {
        self.routes.len()
    }

    fn route(&mut self, pair: &str, analysis_tx: &mpsc::Sender<PairAnalysis>) -> mpsc::Sender<CandleEvent> {
        if let Some(tx) = self.routes.get(pair) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let mut tracker = PairTracker::new(pair, self.capacity, Arc::clone(&self.analyzer));
        let seeded = self
            .history
            .remove(pair)
            .map_or(0, |history| tracker.seed(&history));
        tokio::spawn(tracker.run(rx, analysis_tx.clone()));
        info!(pair = %pair, seeded, "Started pair tracker");
        self.routes.insert(pair.to_string(), tx.clone());
        tx
    }

    /// Run the routing loop until the market channel closes.
    pub async fn run(
        mut self,
        mut market_rx: broadcast::Receiver<CandleEvent>,
        analysis_tx: mpsc::Sender<PairAnalysis>,
    ) {
        info!("StrategyRegistry running");
        loop {
            match market_rx.recv().await {
                Ok(event) => {
                    if !event.is_closed {
                        continue;
                    }
                    let tx = self.route(&event.pair, &analysis_tx);
                    if tx.send(event).await.is_err() {
                        warn!("Pair tracker stopped, analysis channel closed");
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Strategy registry lagged, dropped candle events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Market channel closed, stopping strategy registry");
                    return;
                }
            }
        }
    }
}
