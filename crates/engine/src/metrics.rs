use serde::{Deserialize, Serialize};

use common::{EquityPoint, Trade};

/// Summary statistics of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// `(final - initial) / initial`, as a fraction.
    pub total_return: f64,
    /// `wins / trades`, 0 without trades.
    pub win_rate: f64,
    /// Largest peak-to-trough decline of the equity curve, in percent.
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Gross profit over gross loss. `None` when no trade lost money.
    pub profit_factor: Option<f64>,
    pub final_balance: f64,
    pub average_trade_pnl: f64,
}

impl Metrics {
    pub fn compute(initial_balance: f64, final_balance: f64, trades: &[Trade], equity: &[EquityPoint]) -> Self {
        let total_return = if initial_balance > 0.0 {
            (final_balance - initial_balance) / initial_balance
        } else {
            0.0
        };

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        for trade in trades {
            if trade.pnl > 0.0 {
                wins += 1;
                gross_profit += trade.pnl;
            } else if trade.pnl < 0.0 {
                losses += 1;
                gross_loss += trade.pnl.abs();
            }
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        };
        let average_trade_pnl = if total_trades > 0 {
            trades.iter().map(|t| t.pnl).sum::<f64>() / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_return,
            win_rate,
            max_drawdown: max_drawdown_pct(equity),
            total_trades,
            wins,
            losses,
            profit_factor: (gross_loss > 0.0).then(|| gross_profit / gross_loss),
            final_balance,
            average_trade_pnl,
        }
    }
}

/// Largest peak-to-trough decline in percent, clamped to `[0, 100]`.
pub fn max_drawdown_pct(equity: &[EquityPoint]) -> f64 {
    let Some(first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    for point in equity {
        if point.value > peak {
            peak = point.value;
        } else if peak > 0.0 {
            let dd = (peak - point.value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    (max_dd * 100.0).clamp(0.0, 100.0)
}
