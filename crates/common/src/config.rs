use crate::RunMode;

/// All process configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    pub run_mode: RunMode,

    // Market data
    pub pairs: Vec<String>,
    pub kline_interval: String,
    pub exchange_base_url: String,
    pub backtest_limit: usize,

    // Account
    pub initial_balance: f64,

    // Database
    pub database_url: String,

    // Engine tuning file path
    pub strategy_config_path: String,

    /// Seed for the synthetic fallback generator.
    pub synthetic_seed: u64,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let run_mode = match optional_env("RUN_MODE")
            .unwrap_or_else(|| "backtest".to_string())
            .to_lowercase()
            .as_str()
        {
            "backtest" => RunMode::Backtest,
            "live" => RunMode::Live,
            other => panic!("ERROR: RUN_MODE must be 'backtest' or 'live', got: '{other}'"),
        };

        let pairs = parse_pairs(&required_env("PAIRS"));
        if pairs.is_empty() {
            panic!("PAIRS must list at least one trading pair, e.g. 'BTCUSDT,ETHUSDT'");
        }

        Config {
            run_mode,
            pairs,
            kline_interval: optional_env("KLINE_INTERVAL").unwrap_or_else(|| "5m".to_string()),
            exchange_base_url: optional_env("EXCHANGE_BASE_URL")
                .unwrap_or_else(|| "https://api.binance.com".to_string()),
            backtest_limit: optional_env("BACKTEST_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            initial_balance: optional_env("INITIAL_BALANCE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000.0),
            database_url: required_env("DATABASE_URL"),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
            synthetic_seed: optional_env("SYNTHETIC_SEED")
                .and_then(|v| v.parse().ok())
                .unwrap_or(42),
        }
    }
}

/// Split a comma-separated pair list, trimming and upper-casing entries.
pub fn parse_pairs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
