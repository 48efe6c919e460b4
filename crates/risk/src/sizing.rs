use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Error, Result, Signal, SignalSource, SignalType};

/// Position sizing parameters. Leverage multipliers are tunable heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Fraction of balance committed as margin per trade (e.g. 0.02 = 2%).
    pub risk_per_trade: f64,
    pub base_leverage: f64,
    pub min_leverage: f64,
    pub max_leverage: f64,
    /// Signals at or above this strength get `strong_multiplier`.
    pub strong_strength: f64,
    pub strong_multiplier: f64,
    /// Combined signals with at least this many confirmations get
    /// `confirmed_multiplier`.
    pub confirmed_count: u32,
    pub confirmed_multiplier: f64,
    /// Applied when RSI sits in the zone opposite to the trade direction.
    pub opposite_zone_multiplier: f64,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.02,
            base_leverage: 3.0,
            min_leverage: 1.0,
            max_leverage: 10.0,
            strong_strength: 0.8,
            strong_multiplier: 1.5,
            confirmed_count: 3,
            confirmed_multiplier: 1.25,
            opposite_zone_multiplier: 0.5,
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

/// Sizing outcome. `size` is the notional in quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeDecision {
    pub size: f64,
    pub leverage: f64,
    pub margin: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    pub config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Size a trade: `size = balance * risk_per_trade * leverage`.
    ///
    /// Fails on non-finite or non-positive balance or price, a non-finite
    /// RSI, or a neutral signal. Callers treat an error as "no trade".
    pub fn size(
        &self,
        balance: f64,
        price: f64,
        signal: &Signal,
        rsi: Option<f64>,
    ) -> Result<SizeDecision> {
        positive("balance", balance)?;
        positive("price", price)?;
        if let Some(r) = rsi {
            if !r.is_finite() {
                return Err(Error::InvalidInput(format!("rsi must be finite, got {r}")));
            }
        }
        if signal.kind == SignalType::Neutral {
            return Err(Error::InvalidInput("cannot size a neutral signal".into()));
        }
        let risk = self.config.risk_per_trade;
        if !risk.is_finite() || risk <= 0.0 || risk > 1.0 {
            return Err(Error::InvalidInput(format!(
                "risk_per_trade must be in (0, 1], got {risk}"
            )));
        }

        let leverage = self.leverage(signal, rsi);
        let margin = balance * risk;
        let size = margin * leverage;
        debug!(balance, leverage, size, "Position sized");
        Ok(SizeDecision {
            size,
            leverage,
            margin,
            quantity: size / price,
        })
    }

    /// Base leverage adjusted by signal quality and RSI zone, clamped to
    /// `[min_leverage, max_leverage]`.
    pub fn leverage(&self, signal: &Signal, rsi: Option<f64>) -> f64 {
        let cfg = &self.config;
        let mut up: f64 = 1.0;
        if signal.strength >= cfg.strong_strength {
            up = up.max(cfg.strong_multiplier);
        }
        if signal.source == SignalSource::Combined && signal.confirmations >= cfg.confirmed_count {
            up = up.max(cfg.confirmed_multiplier);
        }
        let mut leverage = cfg.base_leverage * up;

        let opposite = match (signal.kind, rsi) {
            (SignalType::Bullish, Some(r)) => r >= cfg.overbought,
            (SignalType::Bearish, Some(r)) => r <= cfg.oversold,
            _ => false,
        };
        if opposite {
            leverage *= cfg.opposite_zone_multiplier;
        }

        let (lo, hi) = (cfg.min_leverage, cfg.max_leverage.max(cfg.min_leverage));
        leverage.clamp(lo, hi)
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{name} must be a positive number, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(kind: SignalType, source: SignalSource, strength: f64, confirmations: u32) -> Signal {
        Signal::new(kind, source, strength, 0.5).with_confirmations(confirmations)
    }

    #[test]
    fn base_size() {
        let sizer = PositionSizer::default();
        let sig = signal(SignalType::Bullish, SignalSource::Volume, 0.5, 1);
        let d = sizer.size(10_000.0, 100.0, &sig, Some(50.0)).unwrap();
        assert_eq!(d.leverage, 3.0);
        assert!((d.size - 600.0).abs() < 1e-9);
        assert!((d.margin - 200.0).abs() < 1e-9);
        assert!((d.quantity - 6.0).abs() < 1e-9);
    }

    #[test]
    fn strong_and_confirmed_signals_lever_up() {
        let sizer = PositionSizer::default();
        let strong = signal(SignalType::Bullish, SignalSource::Divergence, 0.9, 1);
        assert!((sizer.leverage(&strong, None) - 4.5).abs() < 1e-9);

        let confirmed = signal(SignalType::Bearish, SignalSource::Combined, 0.5, 3);
        assert!((sizer.leverage(&confirmed, None) - 3.75).abs() < 1e-9);
    }

    #[test]
    fn opposite_rsi_zone_levers_down() {
        let sizer = PositionSizer::default();
        let long = signal(SignalType::Bullish, SignalSource::Volume, 0.5, 1);
        assert!((sizer.leverage(&long, Some(75.0)) - 1.5).abs() < 1e-9);
        let short = signal(SignalType::Bearish, SignalSource::Volume, 0.5, 1);
        assert!((sizer.leverage(&short, Some(25.0)) - 1.5).abs() < 1e-9);
        // same-side extremes do not de-risk
        assert_eq!(sizer.leverage(&long, Some(25.0)), 3.0);
    }

    #[test]
    fn leverage_is_clamped() {
        let sizer = PositionSizer::new(SizingConfig {
            base_leverage: 20.0,
            ..SizingConfig::default()
        });
        let sig = signal(SignalType::Bullish, SignalSource::Volume, 0.9, 1);
        assert_eq!(sizer.leverage(&sig, None), 10.0);

        let sizer = PositionSizer::new(SizingConfig {
            base_leverage: 1.0,
            ..SizingConfig::default()
        });
        assert_eq!(sizer.leverage(&sig, Some(90.0)), 1.0);
    }

    #[test]
    fn invalid_inputs_fail() {
        let sizer = PositionSizer::default();
        let sig = signal(SignalType::Bullish, SignalSource::Volume, 0.5, 1);
        assert!(sizer.size(0.0, 100.0, &sig, None).is_err());
        assert!(sizer.size(-5.0, 100.0, &sig, None).is_err());
        assert!(sizer.size(f64::NAN, 100.0, &sig, None).is_err());
        assert!(sizer.size(1000.0, f64::INFINITY, &sig, None).is_err());
        assert!(sizer.size(1000.0, 100.0, &sig, Some(f64::NAN)).is_err());

        let neutral = signal(SignalType::Neutral, SignalSource::Volume, 0.5, 1);
        assert!(sizer.size(1000.0, 100.0, &neutral, None).is_err());
    }
}
