use std::f64::consts::PI;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use common::{parse_interval, Candle, MarketDataSource, Result};

/// Shape of the generated market.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub start_price: f64,
    /// Standard deviation of the per-candle log return.
    pub volatility: f64,
    /// Amplitude of the slow cyclical drift, per candle.
    pub cycle_amplitude: f64,
    /// Length of one drift cycle in candles.
    pub cycle_length: usize,
    pub base_volume: f64,
    /// Chance that a candle is a volume burst.
    pub burst_probability: f64,
    pub burst_multiplier: f64,
    /// Timestamp of the last generated candle. `None` means now, aligned
    /// down to the interval.
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: 30_000.0,
            volatility: 0.004,
            cycle_amplitude: 0.0015,
            cycle_length: 120,
            base_volume: 100.0,
            burst_probability: 0.05,
            burst_multiplier: 3.0,
            end_time: None,
        }
    }
}

/// Seeded random-walk candles. Never real market data: results built on it
/// must be tagged synthetic by the caller.
pub struct SyntheticMarketData {
    config: SyntheticConfig,
}

impl SyntheticMarketData {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(SyntheticConfig {
            seed,
            ..SyntheticConfig::default()
        })
    }

    /// Generate `count` candles ending at `end`. Same inputs, same candles.
    pub fn generate(&self, pair: &str, step: Duration, count: usize, end: DateTime<Utc>) -> Vec<Candle> {
        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed ^ pair_salt(pair));
        let cycle = cfg.cycle_length.max(1) as f64;
        let mut price = cfg.start_price.max(f64::MIN_POSITIVE);
        let mut candles = Vec::with_capacity(count);

        for i in 0..count {
            let back = (count - 1 - i) as i32;
            let timestamp = end - step * back;

            let drift = cfg.cycle_amplitude * (2.0 * PI * i as f64 / cycle).sin();
            let ret = drift + cfg.volatility * standard_normal(&mut rng);
            let open = price;
            let close = open * ret.exp();

            let wick = cfg.volatility * 0.5;
            let high = open.max(close) * (1.0 + wick * rng.gen::<f64>());
            let low = open.min(close) * (1.0 - wick * rng.gen::<f64>());

            let mut volume = cfg.base_volume * (0.5 + rng.gen::<f64>());
            if rng.gen::<f64>() < cfg.burst_probability {
                volume *= cfg.burst_multiplier;
            }

            candles.push(Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
            price = close;
        }
        candles
    }
}

#[async_trait]
impl MarketDataSource for SyntheticMarketData {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch_candles(&self, pair: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let step = parse_interval(interval)?;
        let end = match self.config.end_time {
            Some(end) => end,
            None => align_down(Utc::now(), step),
        };
        warn!(pair = %pair, interval = %interval, limit, seed = self.config.seed, "Generating SYNTHETIC candles");
        let candles = self.generate(pair, step, limit, end);
        info!(pair = %pair, count = candles.len(), "Synthetic candles ready");
        Ok(candles)
    }
}

fn align_down(now: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_secs = step.num_seconds().max(1);
    let secs = now.timestamp() - now.timestamp().rem_euclid(step_secs);
    Utc.timestamp_opt(secs, 0).single().unwrap_or(now)
}

/// Box-Muller transform over two uniform draws.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// FNV-1a, so each pair gets its own stable path for one seed.
fn pair_salt(pair: &str) -> u64 {
    pair.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}
