use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{CandleEvent, CandleWindow, Config, RunMode};
use engine::{
    load_history, BacktestRunner, BacktestStore, BinanceMarketData, BinanceStream, Dispatcher,
    EngineEvent, EventBus, LivePipeline, SqliteStore, StrategyFileConfig,
};
use risk::{spawn_governor, RiskGovernor};
use strategy::{PairAnalysis, SignalAnalyzer, StrategyRegistry};
use synthetic::{SyntheticConfig, SyntheticMarketData};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path);
    info!(mode = ?cfg.run_mode, pairs = ?cfg.pairs, interval = %cfg.kline_interval, "DivBot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let db = SqlitePool::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to database: {e}"));
    let store = Arc::new(SqliteStore::new(db));
    store
        .migrate()
        .await
        .unwrap_or_else(|e| panic!("Database migration failed: {e}"));
    info!("Database ready");

    // ── Events ────────────────────────────────────────────────────────────────
    let (dispatcher, event_tx, bus) = Dispatcher::new(256, 1024);
    tokio::spawn(dispatcher.run());
    tokio::spawn(log_events(bus));

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    match cfg.run_mode {
        RunMode::Backtest => run_backtests(&cfg, &strategy_file, store, event_tx, &shutdown).await,
        RunMode::Live => run_live(&cfg, &strategy_file, event_tx, &shutdown).await,
    }
    info!("Exiting.");
}

async fn run_backtests(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    store: Arc<SqliteStore>,
    event_tx: mpsc::Sender<EngineEvent>,
    shutdown: &CancellationToken,
) {
    let exchange = BinanceMarketData::new(cfg.exchange_base_url.clone())
        .unwrap_or_else(|e| panic!("Failed to build HTTP client: {e}"));
    let fallback = SyntheticMarketData::new(SyntheticConfig {
        seed: cfg.synthetic_seed,
        ..SyntheticConfig::default()
    });
    let runner = BacktestRunner::new(Arc::new(exchange), cfg.backtest_limit)
        .with_fallback(Arc::new(fallback))
        .with_store(store.clone())
        .with_events(event_tx);

    let configs = cfg
        .pairs
        .iter()
        .map(|pair| {
            let mut sim = strategy_file.simulation(pair, &cfg.kline_interval);
            sim.backtest.initial_balance = cfg.initial_balance;
            sim
        })
        .collect();

    for (pair, outcome) in cfg.pairs.iter().zip(runner.run_all(configs, shutdown).await) {
        match outcome {
            Ok(run) => {
                let m = &run.report.result.metrics;
                info!(
                    pair = %pair,
                    id = %run.id,
                    origin = ?run.report.origin,
                    trades = m.total_trades,
                    total_return_pct = m.total_return * 100.0,
                    win_rate = m.win_rate,
                    max_drawdown_pct = m.max_drawdown,
                    "Backtest complete"
                );
                if run.report.is_synthetic() {
                    warn!(pair = %pair, "Result is based on SYNTHETIC data, not exchange history");
                }
            }
            Err(e) => error!(pair = %pair, error = %e, "Backtest failed"),
        }
    }

    match store.recent(10).await {
        Ok(runs) => info!(stored_runs = runs.len(), "Recent backtests in store"),
        Err(e) => warn!(error = %e, "Could not list stored backtests"),
    }
}

async fn run_live(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    event_tx: mpsc::Sender<EngineEvent>,
    shutdown: &CancellationToken,
) {
    let governor = RiskGovernor::new(strategy_file.governor.clone(), cfg.initial_balance);
    let (governor_handle, _governor_task) = spawn_governor(governor, 64);

    // ── Strategy registry ─────────────────────────────────────────────────────
    let analyzer = Arc::new(SignalAnalyzer::new(&strategy_file.analyzer));
    let mut registry = StrategyRegistry::new(analyzer, CandleWindow::DEFAULT_CAPACITY);

    let exchange = BinanceMarketData::new(cfg.exchange_base_url.clone())
        .unwrap_or_else(|e| panic!("Failed to build HTTP client: {e}"));
    for pair in &cfg.pairs {
        match load_history(
            &exchange,
            pair,
            &cfg.kline_interval,
            CandleWindow::DEFAULT_CAPACITY,
            Utc::now(),
        )
        .await
        {
            Ok(history) => registry = registry.with_history(pair.clone(), history),
            Err(e) => warn!(pair = %pair, error = %e, "History backfill failed, warming up from the stream"),
        }
    }

    let (market_tx, market_rx) = broadcast::channel::<CandleEvent>(1024);
    let (analysis_tx, analysis_rx) = mpsc::channel::<PairAnalysis>(128);
    tokio::spawn(registry.run(market_rx, analysis_tx));

    // ── Market data ───────────────────────────────────────────────────────────
    for pair in &cfg.pairs {
        let stream = BinanceStream::new(pair.clone(), cfg.kline_interval.clone(), market_tx.clone());
        tokio::spawn(stream.run(shutdown.child_token()));
    }

    // ── Suggestions ───────────────────────────────────────────────────────────
    let pipeline = LivePipeline::new(strategy_file.live(), governor_handle, event_tx);
    tokio::spawn(pipeline.run(analysis_rx));

    info!("All subsystems started. Waiting for shutdown signal.");
    shutdown.cancelled().await;
}

/// Log every published event as one JSON line.
async fn log_events(bus: EventBus) {
    let mut rx = bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!(event = %json, "Engine event"),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(dropped = n, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
