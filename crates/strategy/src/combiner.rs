use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Signal, SignalSource, SignalType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// A trend-follow candidate stronger than this wins outright.
    pub trend_priority_strength: f64,
    /// A single candidate stronger than this qualifies its direction.
    pub strong_threshold: f64,
    /// Number of agreeing candidates that qualifies a direction.
    pub min_agreeing: usize,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            trend_priority_strength: 0.3,
            strong_threshold: 0.6,
            min_agreeing: 2,
        }
    }
}

/// Fuses detector candidates into at most one actionable signal.
#[derive(Debug, Clone, Default)]
pub struct SignalCombiner {
    pub config: CombinerConfig,
}

impl SignalCombiner {
    pub fn new(config: CombinerConfig) -> Self {
        Self { config }
    }

    pub fn combine(&self, candidates: &[Signal]) -> Option<Signal> {
        if let Some(trend) = candidates.iter().find(|s| {
            s.source == SignalSource::Trend
                && s.kind != SignalType::Neutral
                && s.strength > self.config.trend_priority_strength
        }) {
            debug!(kind = %trend.kind, strength = trend.strength, "trend signal takes priority");
            return Some(trend.clone());
        }

        let bullish = self.qualify(candidates, SignalType::Bullish);
        let bearish = self.qualify(candidates, SignalType::Bearish);

        match (bullish, bearish) {
            (Some(b), Some(s)) => {
                // Both directions qualify: more agreement, then more strength.
                if b.confirmations != s.confirmations {
                    Some(if b.confirmations > s.confirmations { b } else { s })
                } else if b.strength > s.strength {
                    Some(b)
                } else if s.strength > b.strength {
                    Some(s)
                } else {
                    debug!("opposing signals tied, no decision");
                    None
                }
            }
            (b, s) => b.or(s),
        }
    }

    fn qualify(&self, candidates: &[Signal], kind: SignalType) -> Option<Signal> {
        let group: Vec<&Signal> = candidates.iter().filter(|s| s.kind == kind).collect();
        if group.is_empty() {
            return None;
        }
        let has_strong = group
            .iter()
            .any(|s| s.strength > self.config.strong_threshold);
        if !has_strong && group.len() < self.config.min_agreeing {
            return None;
        }

        let n = group.len() as f64;
        let strength = group.iter().map(|s| s.strength).sum::<f64>() / n;
        let confidence = group.iter().map(|s| s.confidence).sum::<f64>() / n;
        Some(
            Signal::new(kind, SignalSource::Combined, strength, confidence)
                .with_confirmations(group.len() as u32),
        )
    }
}
