//! Per-candle analysis: indicator series computed once per candle history,
//! then every detector run on the history visible at one index.

use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Candle, SeriesPoint, Signal};

use crate::combiner::SignalCombiner;
use crate::config::{AnalyzerConfig, IndicatorConfig};
use crate::divergence::DivergenceDetector;
use crate::indicators::{self, align_at, aligned_prefix};
use crate::patterns::{
    volume_ratio, CandlestickDetector, Detector, MarketContext, RsiExtremeDetector,
    TrendFollowDetector, VolumeSpikeDetector, WmDetector,
};

/// Indicator series for one candle history, each suffix-aligned to it.
///
/// The candles must already be valid (see [`Candle::is_valid`]); the
/// indicator functions drop invalid values, which would shift alignment.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    len: usize,
    pub rsi: Vec<f64>,
    pub rsi_points: Vec<SeriesPoint>,
    pub atr: Vec<f64>,
    pub adx: Vec<f64>,
    pub sma_short: Vec<f64>,
    pub sma_long: Vec<f64>,
}

impl IndicatorSet {
    pub fn compute(candles: &[Candle], cfg: &IndicatorConfig) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let rsi = indicators::rsi(&closes, cfg.rsi_period);
        let offset = candles.len().saturating_sub(rsi.len());
        let rsi_points = candles[offset..]
            .iter()
            .zip(&rsi)
            .map(|(c, &value)| SeriesPoint {
                timestamp: c.timestamp,
                value,
            })
            .collect();

        Self {
            len: candles.len(),
            rsi,
            rsi_points,
            atr: indicators::atr(&highs, &lows, &closes, cfg.atr_period),
            adx: indicators::adx(&highs, &lows, &closes, cfg.adx_period),
            sma_short: indicators::sma(&closes, cfg.sma_short),
            sma_long: indicators::sma(&closes, cfg.sma_long),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First candle index at which RSI, ATR and ADX all have a value.
    pub fn warmup(&self) -> usize {
        [&self.rsi, &self.atr, &self.adx]
            .iter()
            .map(|s| self.len.saturating_sub(s.len()))
            .max()
            .unwrap_or(self.len)
    }

    pub fn rsi_at(&self, index: usize) -> Option<f64> {
        align_at(&self.rsi, self.len, index)
    }

    pub fn atr_at(&self, index: usize) -> Option<f64> {
        align_at(&self.atr, self.len, index)
    }

    pub fn adx_at(&self, index: usize) -> Option<f64> {
        align_at(&self.adx, self.len, index)
    }

    pub fn sma_short_at(&self, index: usize) -> Option<f64> {
        align_at(&self.sma_short, self.len, index)
    }

    pub fn sma_long_at(&self, index: usize) -> Option<f64> {
        align_at(&self.sma_long, self.len, index)
    }
}

/// Indicator readings at the analysed candle, as attached to live
/// suggestions and used by the backtest entry filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub rsi: Option<f64>,
    pub prev_rsi: Option<f64>,
    pub atr: Option<f64>,
    pub adx: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub candidates: Vec<Signal>,
    pub combined: Option<Signal>,
    pub snapshot: IndicatorSnapshot,
}

/// Runs the detector set and the combiner over the history ending at one
/// candle index. Nothing after that index is visible.
pub struct SignalAnalyzer {
    detectors: Vec<Box<dyn Detector>>,
    combiner: SignalCombiner,
    config: IndicatorConfig,
}

impl SignalAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let patterns = &config.patterns;
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(DivergenceDetector::new(config.divergence.clone())),
            Box::new(WmDetector::new(patterns.wm.clone())),
            Box::new(VolumeSpikeDetector::new(patterns.volume.clone())),
            Box::new(CandlestickDetector::new(patterns.candlestick.clone())),
            Box::new(TrendFollowDetector::new(patterns.trend.clone())),
            Box::new(RsiExtremeDetector::new(
                patterns.rsi_extreme.clone(),
                config.indicators.rsi_period,
            )),
        ];
        Self::with_detectors(
            detectors,
            SignalCombiner::new(config.combiner.clone()),
            config.indicators.clone(),
        )
    }

    pub fn with_detectors(
        detectors: Vec<Box<dyn Detector>>,
        combiner: SignalCombiner,
        config: IndicatorConfig,
    ) -> Self {
        Self {
            detectors,
            combiner,
            config,
        }
    }

    pub fn indicator_config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Analyse candle `index`. `set` must have been computed from `candles`.
    pub fn analyze(&self, candles: &[Candle], set: &IndicatorSet, index: usize) -> Option<Analysis> {
        if index >= candles.len() || set.len() != candles.len() {
            debug!(index, candles = candles.len(), "analysis index out of range");
            return None;
        }
        let window = self.config.context_window.max(2);
        let history = &candles[..=index];
        let start = history.len().saturating_sub(window);

        let rsi = tail(aligned_prefix(&set.rsi_points, set.len(), index), window);
        let sma_short = tail(aligned_prefix(&set.sma_short, set.len(), index), window);
        let sma_long = tail(aligned_prefix(&set.sma_long, set.len(), index), window);

        let ctx = MarketContext {
            candles: &history[start..],
            rsi,
            sma_short,
            sma_long,
        };

        let candidates: Vec<Signal> = self
            .detectors
            .iter()
            .filter_map(|d| {
                let signal = d.detect(&ctx)?;
                debug!(
                    detector = d.name(),
                    kind = %signal.kind,
                    strength = signal.strength,
                    "candidate signal"
                );
                Some(signal)
            })
            .collect();
        let combined = self.combiner.combine(&candidates);

        let snapshot = IndicatorSnapshot {
            close: candles[index].close,
            rsi: set.rsi_at(index),
            prev_rsi: index.checked_sub(1).and_then(|i| set.rsi_at(i)),
            atr: set.atr_at(index),
            adx: set.adx_at(index),
            volume_ratio: volume_ratio(history, self.config.volume_window),
            sma_short: set.sma_short_at(index),
            sma_long: set.sma_long_at(index),
        };

        Some(Analysis {
            candidates,
            combined,
            snapshot,
        })
    }
}

fn tail<T>(series: &[T], n: usize) -> &[T] {
    &series[series.len().saturating_sub(n)..]
}
