use serde::{Deserialize, Serialize};

use crate::combiner::CombinerConfig;
use crate::divergence::DivergenceConfig;
use crate::patterns::PatternConfig;

/// Indicator periods and the detector history window.
///
/// Example `[indicators]` section:
/// ```toml
/// rsi_period = 14
/// atr_period = 14
/// adx_period = 14
/// sma_short = 10
/// sma_long = 30
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub sma_short: usize,
    pub sma_long: usize,
    /// Trailing candles in the volume-ratio average.
    pub volume_window: usize,
    /// Number of trailing candles handed to detectors at each index.
    pub context_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
            sma_short: 10,
            sma_long: 30,
            volume_window: 4,
            context_window: 100,
        }
    }
}

/// Everything needed to build a [`SignalAnalyzer`](crate::SignalAnalyzer).
/// Missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub indicators: IndicatorConfig,
    pub divergence: DivergenceConfig,
    pub patterns: PatternConfig,
    pub combiner: CombinerConfig,
}
