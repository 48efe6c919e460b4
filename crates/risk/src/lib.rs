//! Position sizing, exit rules and the account risk governor.

pub mod actor;
pub mod exits;
pub mod governor;
pub mod sizing;

pub use actor::{spawn_governor, GovernorHandle};
pub use exits::{ExitConfig, ExitDecision, ExitLevels, ExitPolicy};
pub use governor::{
    ExposureId, GovernorConfig, GovernorState, PairCorrelation, RiskGovernor, RiskLimits,
    RiskMetrics, RiskStatus, TradeRequest,
};
pub use sizing::{PositionSizer, SizeDecision, SizingConfig};
