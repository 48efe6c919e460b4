use serde::{Deserialize, Serialize};

use common::{Error, Result};
use risk::{ExitConfig, GovernorConfig, SizingConfig};
use strategy::AnalyzerConfig;

use crate::backtest::{BacktestConfig, SimulationConfig};
use crate::live::LiveConfig;

/// Engine tuning file (TOML). Every section is optional.
///
/// Example `config/strategy.toml`:
/// ```toml
/// [indicators]
/// rsi_period = 14
///
/// [divergence]
/// tolerance_secs = 300
///
/// [backtest]
/// initial_balance = 10000.0
/// cooldown = 3
///
/// [backtest.quality]
/// weak_max = 0.5
///
/// [governor]
/// max_daily_loss = 0.05
/// emergency_stop_loss = 0.08
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyFileConfig {
    #[serde(flatten)]
    pub analyzer: AnalyzerConfig,
    pub sizing: SizingConfig,
    pub exits: ExitConfig,
    pub backtest: BacktestConfig,
    pub governor: GovernorConfig,
}

impl StrategyFileConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path).unwrap_or_else(|e| {
            panic!("Failed to read strategy config at '{path}': {e}")
        });
        Self::from_toml_str(&content).unwrap_or_else(|e| {
            panic!("Failed to parse strategy config at '{path}': {e}")
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Simulation parameters for one pair.
    pub fn simulation(&self, pair: &str, interval: &str) -> SimulationConfig {
        SimulationConfig {
            pair: pair.to_string(),
            interval: interval.to_string(),
            backtest: self.backtest.clone(),
            analyzer: self.analyzer.clone(),
            sizing: self.sizing.clone(),
            exits: self.exits.clone(),
            governor: self.governor.clone(),
        }
    }

    /// Live suggestions use the backtest entry filters unchanged.
    pub fn live(&self) -> LiveConfig {
        LiveConfig {
            entry: self.backtest.clone(),
            sizing: self.sizing.clone(),
            exits: self.exits.clone(),
            ..LiveConfig::default()
        }
    }
}
