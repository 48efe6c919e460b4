pub mod backtest;
pub mod binance;
pub mod config;
pub mod dispatcher;
pub mod live;
pub mod metrics;
pub mod orchestrator;
pub mod store;

pub use backtest::{
    calculate_pnl, entry_signal, simulate, simulate_with, AnalyzerProvider, BacktestConfig,
    BacktestResult, QualityGate, SignalProvider, SignalRecord, SimulationConfig,
};
pub use binance::{BinanceMarketData, BinanceStream};
pub use config::StrategyFileConfig;
pub use dispatcher::{Dispatcher, EngineEvent, EventBus};
pub use live::{load_history, LiveConfig, LivePipeline, Suggestion};
pub use metrics::{max_drawdown_pct, Metrics};
pub use orchestrator::{BacktestReport, BacktestRunner, CompletedRun};
pub use store::{BacktestStore, SqliteStore, StoredRun};
