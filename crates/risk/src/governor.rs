//! Account-level risk state machine.
//!
//! `NORMAL -> DAILY_LIMIT_REACHED` on daily loss (cleared by `daily_reset`),
//! `NORMAL -> EMERGENCY_STOPPED` on session loss or open risk (cleared only by
//! `reset_emergency_stop`). The governor is plain synchronous state; share it
//! between tasks through [`GovernorHandle`](crate::GovernorHandle).

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{RejectionReason, RiskState, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub a: String,
    pub b: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Daily loss fraction of the day-start balance that blocks new trades.
    pub max_daily_loss: f64,
    /// Session loss fraction (or open risk fraction) that triggers the
    /// emergency stop.
    pub emergency_stop_loss: f64,
    pub max_open_positions: usize,
    /// Maximum notional on one pair as a fraction of the balance.
    pub max_concentration: f64,
    /// Correlation at or above which a same-direction trade is refused.
    pub max_correlation: f64,
    pub correlations: Vec<PairCorrelation>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: 0.05,
            emergency_stop_loss: 0.08,
            max_open_positions: 3,
            max_concentration: 0.5,
            max_correlation: 0.8,
            correlations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernorState {
    Normal,
    DailyLimitReached,
    EmergencyStopped,
}

/// A prospective trade. `risk_amount` is the quote amount lost if the stop
/// is hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub pair: String,
    pub side: Side,
    pub notional: f64,
    pub risk_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExposureId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Exposure {
    id: ExposureId,
    request: TradeRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub daily_loss_fraction: f64,
    pub session_loss_fraction: f64,
    pub open_risk_fraction: f64,
    pub open_notional: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLimits {
    pub max_daily_loss: f64,
    pub emergency_stop_loss: f64,
    pub max_open_positions: usize,
    pub max_concentration: f64,
    pub max_correlation: f64,
}

/// Snapshot exposed to status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStatus {
    pub account_balance: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub open_positions: usize,
    pub emergency_stop_triggered: bool,
    pub state: GovernorState,
    pub risk_metrics: RiskMetrics,
    pub limits: RiskLimits,
}

pub struct RiskGovernor {
    config: GovernorConfig,
    balance: f64,
    day_start_balance: f64,
    session_start_balance: f64,
    risk: RiskState,
    open: Vec<Exposure>,
    next_id: u64,
}

impl RiskGovernor {
    pub fn new(config: GovernorConfig, balance: f64) -> Self {
        info!(balance, "RiskGovernor initialised");
        Self {
            config,
            balance,
            day_start_balance: balance,
            session_start_balance: balance,
            risk: RiskState::default(),
            open: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn risk_state(&self) -> &RiskState {
        &self.risk
    }

    pub fn state(&self) -> GovernorState {
        if self.risk.emergency_stop_triggered {
            GovernorState::EmergencyStopped
        } else if self.risk.daily_loss_limit_reached {
            GovernorState::DailyLimitReached
        } else {
            GovernorState::Normal
        }
    }

    /// Check a prospective trade against every limit. The emergency stop
    /// overrides all other checks.
    pub fn validate_trade(&self, request: &TradeRequest) -> Result<(), RejectionReason> {
        let result = self.check(request);
        if let Err(reason) = &result {
            warn!(pair = %request.pair, side = %request.side, reason = %reason, "Trade rejected by RiskGovernor");
        }
        result
    }

    fn check(&self, request: &TradeRequest) -> Result<(), RejectionReason> {
        if self.risk.emergency_stop_triggered {
            return Err(RejectionReason::EmergencyStop);
        }
        if !request.notional.is_finite() || request.notional <= 0.0 {
            return Err(RejectionReason::InvalidRequest(format!(
                "notional must be positive, got {}",
                request.notional
            )));
        }
        if !request.risk_amount.is_finite() || request.risk_amount < 0.0 {
            return Err(RejectionReason::InvalidRequest(format!(
                "risk amount must be non-negative, got {}",
                request.risk_amount
            )));
        }
        if self.risk.daily_loss_limit_reached {
            return Err(RejectionReason::DailyLossLimit);
        }
        if self.open.len() >= self.config.max_open_positions {
            return Err(RejectionReason::MaxOpenPositions {
                limit: self.config.max_open_positions,
            });
        }

        if self.balance > 0.0 {
            let on_pair: f64 = self
                .open
                .iter()
                .filter(|e| e.request.pair == request.pair)
                .map(|e| e.request.notional)
                .sum();
            let fraction = (on_pair + request.notional) / self.balance;
            if fraction > self.config.max_concentration {
                return Err(RejectionReason::ConcentrationLimit {
                    fraction,
                    limit: self.config.max_concentration,
                });
            }
        }

        for existing in &self.open {
            let other = &existing.request;
            let correlation = if other.pair == request.pair {
                1.0
            } else {
                let c = self.correlation(&request.pair, &other.pair);
                if other.side == request.side {
                    c
                } else {
                    -c
                }
            };
            if correlation >= self.config.max_correlation {
                return Err(RejectionReason::Correlated {
                    pair: other.pair.clone(),
                    correlation,
                });
            }
        }
        Ok(())
    }

    fn correlation(&self, a: &str, b: &str) -> f64 {
        self.config
            .correlations
            .iter()
            .find(|c| (c.a == a && c.b == b) || (c.a == b && c.b == a))
            .map(|c| c.value)
            .unwrap_or(0.0)
    }

    /// Validate and record a newly opened position.
    pub fn register_open(&mut self, request: TradeRequest) -> Result<ExposureId, RejectionReason> {
        self.validate_trade(&request)?;
        let id = ExposureId(self.next_id);
        self.next_id += 1;
        info!(pair = %request.pair, side = %request.side, notional = request.notional, "Position registered");
        self.open.push(Exposure { id, request });
        self.risk.open_positions = self.open.len();
        self.evaluate_transitions();
        Ok(id)
    }

    /// Remove an open position and book its realized P&L. Returns `false`
    /// for an unknown id (the P&L is still booked).
    pub fn record_close(&mut self, id: ExposureId, pnl: f64) -> bool {
        let known = match self.open.iter().position(|e| e.id == id) {
            Some(idx) => {
                self.open.remove(idx);
                true
            }
            None => {
                warn!(id = id.0, "Close recorded for unknown position");
                false
            }
        };
        self.risk.open_positions = self.open.len();
        self.record_trade_result(pnl);
        known
    }

    /// Book a realized P&L against the balance and every P&L window.
    pub fn record_trade_result(&mut self, pnl: f64) {
        if !pnl.is_finite() {
            warn!(pnl, "Ignoring non-finite trade result");
            return;
        }
        self.balance += pnl;
        self.risk.daily_pnl += pnl;
        self.risk.weekly_pnl += pnl;
        self.risk.session_pnl += pnl;
        self.evaluate_transitions();
    }

    fn evaluate_transitions(&mut self) {
        let metrics = self.metrics();
        if !self.risk.emergency_stop_triggered {
            if metrics.session_loss_fraction >= self.config.emergency_stop_loss {
                warn!(
                    loss_pct = metrics.session_loss_fraction * 100.0,
                    "Session loss limit breached, EMERGENCY STOP"
                );
                self.risk.emergency_stop_triggered = true;
            } else if metrics.open_risk_fraction >= self.config.emergency_stop_loss {
                warn!(
                    open_risk_pct = metrics.open_risk_fraction * 100.0,
                    "Open risk limit breached, EMERGENCY STOP"
                );
                self.risk.emergency_stop_triggered = true;
            }
        }
        if !self.risk.daily_loss_limit_reached
            && metrics.daily_loss_fraction >= self.config.max_daily_loss
        {
            warn!(
                loss_pct = metrics.daily_loss_fraction * 100.0,
                "Daily loss limit reached"
            );
            self.risk.daily_loss_limit_reached = true;
        }
    }

    fn metrics(&self) -> RiskMetrics {
        let loss_fraction = |pnl: f64, base: f64| {
            if base > 0.0 {
                (-pnl / base).max(0.0)
            } else {
                0.0
            }
        };
        let open_risk: f64 = self.open.iter().map(|e| e.request.risk_amount).sum();
        RiskMetrics {
            daily_loss_fraction: loss_fraction(self.risk.daily_pnl, self.day_start_balance),
            session_loss_fraction: loss_fraction(self.risk.session_pnl, self.session_start_balance),
            open_risk_fraction: if self.balance > 0.0 {
                open_risk / self.balance
            } else {
                0.0
            },
            open_notional: self.open.iter().map(|e| e.request.notional).sum(),
        }
    }

    /// Start a new trading day. Does not clear an emergency stop.
    pub fn daily_reset(&mut self) {
        info!(daily_pnl = self.risk.daily_pnl, "Daily risk reset");
        self.risk.daily_pnl = 0.0;
        self.risk.daily_loss_limit_reached = false;
        self.day_start_balance = self.balance;
    }

    pub fn weekly_reset(&mut self) {
        info!(weekly_pnl = self.risk.weekly_pnl, "Weekly risk reset");
        self.risk.weekly_pnl = 0.0;
    }

    /// Manual action that clears the emergency stop and starts a new
    /// session from the current balance.
    pub fn reset_emergency_stop(&mut self) {
        if self.risk.emergency_stop_triggered {
            warn!(balance = self.balance, "Emergency stop manually reset");
        }
        self.risk.emergency_stop_triggered = false;
        self.risk.session_pnl = 0.0;
        self.session_start_balance = self.balance;
    }

    pub fn status(&self) -> RiskStatus {
        RiskStatus {
            account_balance: self.balance,
            daily_pnl: self.risk.daily_pnl,
            weekly_pnl: self.risk.weekly_pnl,
            open_positions: self.open.len(),
            emergency_stop_triggered: self.risk.emergency_stop_triggered,
            state: self.state(),
            risk_metrics: self.metrics(),
            limits: RiskLimits {
                max_daily_loss: self.config.max_daily_loss,
                emergency_stop_loss: self.config.emergency_stop_loss,
                max_open_positions: self.config.max_open_positions,
                max_concentration: self.config.max_concentration,
                max_correlation: self.config.max_correlation,
            },
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pair: &str, side: Side, notional: f64) -> TradeRequest {
        TradeRequest {
            pair: pair.into(),
            side,
            notional,
            risk_amount: notional * 0.03,
        }
    }

    fn governor() -> RiskGovernor {
        RiskGovernor::new(
            GovernorConfig {
                // keep the daily limit out of the way of emergency tests
                max_daily_loss: 0.5,
                ..GovernorConfig::default()
            },
            10_000.0,
        )
    }

    #[test]
    fn emergency_stop_after_eight_percent_loss() {
        let mut gov = governor();
        for _ in 0..3 {
            gov.record_trade_result(-250.0);
        }
        assert_eq!(gov.state(), GovernorState::Normal);
        assert!(gov.validate_trade(&request("BTCUSDT", Side::Long, 500.0)).is_ok());

        gov.record_trade_result(-50.0);
        assert_eq!(gov.state(), GovernorState::EmergencyStopped);

        let err = gov
            .validate_trade(&request("BTCUSDT", Side::Long, 500.0))
            .unwrap_err();
        assert_eq!(err, RejectionReason::EmergencyStop);
        assert!(err.to_string().contains("Emergency stop"));

        // even otherwise-invalid requests get the emergency reason
        let err = gov
            .validate_trade(&request("BTCUSDT", Side::Long, -1.0))
            .unwrap_err();
        assert_eq!(err, RejectionReason::EmergencyStop);

        // wins and daily resets do not clear it
        gov.record_trade_result(900.0);
        gov.daily_reset();
        assert_eq!(gov.state(), GovernorState::EmergencyStopped);

        gov.reset_emergency_stop();
        assert_eq!(gov.state(), GovernorState::Normal);
        assert!(gov.validate_trade(&request("BTCUSDT", Side::Long, 500.0)).is_ok());
    }

    #[test]
    fn daily_limit_clears_on_daily_reset() {
        let mut gov = RiskGovernor::new(GovernorConfig::default(), 10_000.0);
        gov.record_trade_result(-300.0);
        gov.record_trade_result(-200.0);
        assert_eq!(gov.state(), GovernorState::DailyLimitReached);
        assert_eq!(
            gov.validate_trade(&request("ETHUSDT", Side::Short, 100.0)),
            Err(RejectionReason::DailyLossLimit)
        );

        gov.daily_reset();
        assert_eq!(gov.state(), GovernorState::Normal);
        assert_eq!(gov.risk_state().daily_pnl, 0.0);
        assert_eq!(gov.risk_state().weekly_pnl, -500.0);

        gov.weekly_reset();
        assert_eq!(gov.risk_state().weekly_pnl, 0.0);
    }

    #[test]
    fn open_risk_triggers_emergency_stop() {
        let mut gov = governor();
        let big = TradeRequest {
            pair: "BTCUSDT".into(),
            side: Side::Long,
            notional: 4_000.0,
            risk_amount: 800.0,
        };
        gov.register_open(big).unwrap();
        assert_eq!(gov.state(), GovernorState::EmergencyStopped);
    }

    #[test]
    fn position_count_limit() {
        let mut gov = governor();
        for pair in ["AUSDT", "BUSDT", "CUSDT"] {
            gov.register_open(request(pair, Side::Long, 500.0)).unwrap();
        }
        assert_eq!(
            gov.validate_trade(&request("DUSDT", Side::Long, 500.0)),
            Err(RejectionReason::MaxOpenPositions { limit: 3 })
        );
    }

    #[test]
    fn concentration_limit() {
        let gov = governor();
        let err = gov
            .validate_trade(&request("BTCUSDT", Side::Long, 6_000.0))
            .unwrap_err();
        assert!(matches!(err, RejectionReason::ConcentrationLimit { .. }));
    }

    #[test]
    fn open_pair_refuses_a_second_position_on_either_side() {
        let mut gov = governor();
        assert!(gov.config().correlations.is_empty());
        gov.register_open(request("SOLUSDT", Side::Long, 500.0)).unwrap();

        for side in [Side::Long, Side::Short] {
            match gov.validate_trade(&request("SOLUSDT", side, 500.0)) {
                Err(RejectionReason::Correlated { pair, correlation }) => {
                    assert_eq!(pair, "SOLUSDT");
                    assert_eq!(correlation, 1.0);
                }
                other => panic!("expected same-pair refusal for {side:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn correlated_positions_are_refused() {
        let mut gov = RiskGovernor::new(
            GovernorConfig {
                correlations: vec![PairCorrelation {
                    a: "BTCUSDT".into(),
                    b: "ETHUSDT".into(),
                    value: 0.9,
                }],
                ..GovernorConfig::default()
            },
            10_000.0,
        );
        let id = gov.register_open(request("BTCUSDT", Side::Long, 500.0)).unwrap();

        // same asset, either side
        assert!(matches!(
            gov.validate_trade(&request("BTCUSDT", Side::Short, 500.0)),
            Err(RejectionReason::Correlated { .. })
        ));
        // correlated asset, same direction
        assert!(matches!(
            gov.validate_trade(&request("ETHUSDT", Side::Long, 500.0)),
            Err(RejectionReason::Correlated { .. })
        ));
        // correlated asset, opposite direction is a hedge
        assert!(gov.validate_trade(&request("ETHUSDT", Side::Short, 500.0)).is_ok());
        // unrelated asset
        assert!(gov.validate_trade(&request("SOLUSDT", Side::Long, 500.0)).is_ok());

        assert!(gov.record_close(id, 25.0));
        assert!(gov.validate_trade(&request("ETHUSDT", Side::Long, 500.0)).is_ok());
        assert_eq!(gov.balance(), 10_025.0);
    }

    #[test]
    fn status_reports_limits_and_exposure() {
        let mut gov = governor();
        gov.register_open(request("BTCUSDT", Side::Long, 1_000.0)).unwrap();
        gov.record_trade_result(-100.0);
        let status = gov.status();
        assert_eq!(status.open_positions, 1);
        assert_eq!(status.daily_pnl, -100.0);
        assert_eq!(status.account_balance, 9_900.0);
        assert_eq!(status.state, GovernorState::Normal);
        assert_eq!(status.limits.emergency_stop_loss, 0.08);
        assert!((status.risk_metrics.open_notional - 1_000.0).abs() < 1e-9);
    }
}
