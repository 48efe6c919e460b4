use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Candle, Error, ExitReason, Position, Result, Side};

/// ATR-based exit parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
    /// Trailing starts once unrealized profit exceeds this fraction of the
    /// target distance.
    pub trailing_activation: f64,
    /// Trailing stop sits this fraction of the target distance from price.
    pub trailing_distance: f64,
    /// Candles after which a position is closed regardless of P&L.
    pub max_holding: usize,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_atr_mult: 1.5,
            target_atr_mult: 3.0,
            trailing_activation: 0.6,
            trailing_distance: 0.15,
            max_holding: 48,
        }
    }
}

/// Initial stop and target. Distances are fractions of the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub stop_distance: f64,
    pub target_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    Hold,
    Exit { reason: ExitReason, price: f64 },
}

#[derive(Debug, Clone, Default)]
pub struct ExitPolicy {
    pub config: ExitConfig,
}

impl ExitPolicy {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    pub fn levels(&self, side: Side, entry_price: f64, atr: f64) -> Result<ExitLevels> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "entry price must be a positive number, got {entry_price}"
            )));
        }
        if !atr.is_finite() || atr <= 0.0 {
            return Err(Error::InvalidInput(format!("ATR must be positive, got {atr}")));
        }

        let stop_distance = atr * self.config.stop_atr_mult / entry_price;
        let target_distance = atr * self.config.target_atr_mult / entry_price;
        if !(stop_distance > 0.0 && stop_distance < 1.0 && target_distance > 0.0) {
            return Err(Error::InvalidInput(format!(
                "exit distances out of range: stop {stop_distance}, target {target_distance}"
            )));
        }

        let sign = side.sign();
        Ok(ExitLevels {
            stop_loss: entry_price * (1.0 - sign * stop_distance),
            take_profit: entry_price * (1.0 + sign * target_distance),
            stop_distance,
            target_distance,
        })
    }

    /// Decide the exit for `position` on `candle` (at `index`), then ratchet
    /// the trailing stop from the close if the position stays open.
    ///
    /// Priority: target, then stop, then holding period.
    pub fn evaluate(&self, position: &mut Position, candle: &Candle, index: usize) -> ExitDecision {
        let (target_hit, stop_hit) = match position.side {
            Side::Long => (
                candle.high >= position.take_profit,
                candle.low <= position.stop_loss,
            ),
            Side::Short => (
                candle.low <= position.take_profit,
                candle.high >= position.stop_loss,
            ),
        };

        if target_hit {
            return ExitDecision::Exit {
                reason: ExitReason::Target,
                price: position.take_profit,
            };
        }
        if stop_hit {
            return ExitDecision::Exit {
                reason: ExitReason::Stop,
                price: position.stop_loss,
            };
        }
        if index.saturating_sub(position.entry_index) >= self.config.max_holding {
            return ExitDecision::Exit {
                reason: ExitReason::Time,
                price: candle.close,
            };
        }

        self.trail(position, candle.close);
        ExitDecision::Hold
    }

    /// Tighten the stop once profit passes the activation level. Never
    /// loosens.
    pub fn trail(&self, position: &mut Position, price: f64) {
        let activation = self.config.trailing_activation * position.target_distance;
        if !position.trailing_active && position.profit_fraction(price) > activation {
            position.trailing_active = true;
            debug!(price, "Trailing stop activated");
        }
        if !position.trailing_active {
            return;
        }

        let gap = self.config.trailing_distance * position.target_distance;
        match position.side {
            Side::Long => {
                let candidate = price * (1.0 - gap);
                if candidate > position.stop_loss {
                    position.stop_loss = candidate;
                }
            }
            Side::Short => {
                let candidate = price * (1.0 + gap);
                if candidate < position.stop_loss {
                    position.stop_loss = candidate;
                }
            }
        }
    }
}
