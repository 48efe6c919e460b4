//! Signal detection: indicators, extrema, RSI divergence, pattern detectors
//! and the combiner that fuses their candidates into one trade signal.

pub mod analyzer;
pub mod combiner;
pub mod config;
pub mod divergence;
pub mod extrema;
pub mod indicators;
pub mod patterns;
pub mod registry;

pub use analyzer::{Analysis, IndicatorSet, IndicatorSnapshot, SignalAnalyzer};
pub use combiner::{CombinerConfig, SignalCombiner};
pub use config::{AnalyzerConfig, IndicatorConfig};
pub use divergence::{Divergence, DivergenceConfig, DivergenceDetector};
pub use extrema::{find_extrema, ExtremePoint, ExtremumKind};
pub use patterns::{Detector, MarketContext, PatternConfig};
pub use registry::{PairAnalysis, PairTracker, StrategyRegistry};
